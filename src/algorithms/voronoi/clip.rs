use num_traits::Float;

/// Clip parameters for the segment p(t) = p0 + t (p1 - p0), t in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ClippedSegment<T> {
  pub t_enter: T,
  pub t_exit: T,
}

impl<T: Float> ClippedSegment<T> {
  pub fn enters_clipped(&self) -> bool {
    self.t_enter > T::zero()
  }

  pub fn exits_clipped(&self) -> bool {
    self.t_exit < T::one()
  }
}

/// Liang-Barsky clipping against an axis-aligned rectangle.
///
/// Returns None when the segment lies entirely outside the rectangle or is
/// degenerate (a point). Axis-parallel segments are handled by the p == 0
/// cases: the parallel pair of borders only ever rejects, never clips.
pub(crate) fn clip_segment<T: Float>(
  x0: T,
  y0: T,
  x1: T,
  y1: T,
  x_min: T,
  x_max: T,
  y_min: T,
  y_max: T,
) -> Option<ClippedSegment<T>> {
  let dx = x1 - x0;
  let dy = y1 - y0;
  if dx == T::zero() && dy == T::zero() {
    return None;
  }
  let mut t_enter = T::zero();
  let mut t_exit = T::one();
  let checks = [
    (-dx, x0 - x_min),
    (dx, x_max - x0),
    (-dy, y0 - y_min),
    (dy, y_max - y0),
  ];
  for &(p, q) in checks.iter() {
    if p == T::zero() {
      if q < T::zero() {
        return None;
      }
      continue;
    }
    let r = q / p;
    if p < T::zero() {
      if r > t_exit {
        return None;
      }
      if r > t_enter {
        t_enter = r;
      }
    } else {
      if r < t_enter {
        return None;
      }
      if r < t_exit {
        t_exit = r;
      }
    }
  }
  if t_enter > t_exit {
    return None;
  }
  Some(ClippedSegment { t_enter, t_exit })
}
