use super::cavity::CavityScore;
use super::tin::IncrementalTin;
use crate::data::{Constraint, EdgeId, MeshVertex, Vertex, VertexId, MAX_CONSTRAINT_INDEX};
use crate::Error;
use claims::debug_assert_ok;
use log::{debug, warn};
use std::collections::VecDeque;

type Result<T> = std::result::Result<T, Error>;

// Backstop against runaway midpoint subdivision on pathological input.
const MAX_CONFORMITY_PASSES: usize = 8;

impl IncrementalTin {
  /// Adds linear and polygon constraints to the triangulation, locking the
  /// mesh against further vertex additions.
  ///
  /// Constraint vertices are inserted through the ordinary engine first
  /// (the merge tolerance applies), then each segment is forced into the
  /// mesh. With `restore_conformity`, constrained edges violating the local
  /// Delaunay criterion are subdivided at synthetic midpoints until the
  /// criterion holds everywhere.
  pub fn add_constraints(
    &mut self,
    mut constraints: Vec<Constraint>,
    restore_conformity: bool,
  ) -> Result<()> {
    if self.disposed {
      return Err(Error::Disposed);
    }
    if self.locked || !self.constraints.is_empty() {
      return Err(Error::Locked);
    }
    if constraints.is_empty() {
      return Ok(());
    }
    if constraints.len() > MAX_CONSTRAINT_INDEX + 1 {
      return Err(Error::ConstraintOverflow);
    }

    // Phase 1: every constraint vertex goes through the ordinary insertion
    // engine, then is resolved to its mesh occupant (which may be a merger
    // group absorbing it).
    for v in constraints.iter().flat_map(|c| c.vertices()) {
      let mut v = *v;
      v.set_constraint_member(true);
      self.add(v)?;
    }
    if !self.bootstrapped {
      return Err(Error::CoLinearViolation);
    }
    let mut paths: Vec<Vec<VertexId>> = Vec::with_capacity(constraints.len());
    for (ci, c) in constraints.iter_mut().enumerate() {
      c.set_index(ci);
      let mut path = Vec::with_capacity(c.vertices().len() + 1);
      for v in c.vertices() {
        let vid = self
          .find_vertex(v.x(), v.y())
          .ok_or(Error::InvariantViolation)?;
        if let Some(occupant) = self.verts[vid.0].as_mut() {
          occupant.set_constraint_member(true);
        }
        path.push(vid);
      }
      if c.is_polygon() && path.len() > 2 {
        path.push(path[0]);
      }
      path.dedup();
      paths.push(path);
    }
    self.locked = true;

    // Phase 2: force each segment into the mesh.
    for (ci, mut path) in paths.into_iter().enumerate() {
      let defines_area = constraints[ci].is_polygon() && constraints[ci].defines_area();
      debug!("constraint {}: {} vertices", ci, path.len());
      let mut i = 0;
      while i + 1 < path.len() {
        self.process_segment(ci, defines_area, &mut path, i)?;
        i += 1;
      }
    }
    self.constraints = constraints;
    debug_assert_ok!(self.check_topology());

    // Phase 3.
    if restore_conformity {
      self.restore_conformity()?;
      debug_assert_ok!(self.check_topology());
    }

    // Phase 4.
    self.flood_fill_areas();
    Ok(())
  }

  fn mark_constrained(&mut self, e: EdgeId, ci: usize, defines_area: bool) {
    self.pool.set_constrained(e, ci);
    if defines_area {
      // The bounded side lies to the left of the directed segment; record
      // whether that is the base half's left face.
      self.pool.set_area_on_base_side(e, e.is_base());
    }
  }

  /// Forces the segment path[i] -> path[i+1] into the mesh. May splice an
  /// intermediate vertex into the path when an existing vertex lies on the
  /// segment, in which case the caller proceeds with the sub-segments.
  fn process_segment(
    &mut self,
    ci: usize,
    defines_area: bool,
    path: &mut Vec<VertexId>,
    i: usize,
  ) -> Result<()> {
    let v0 = path[i];
    let v1 = path[i + 1];
    if v0 == v1 {
      return Ok(());
    }
    let (x0, y0) = self.coords(v0);
    let (x1, y1) = self.coords(v1);
    let seg_len = ((x1 - x0) * (x1 - x0) + (y1 - y0) * (y1 - y0)).sqrt();

    let e0 = self.edge_with_origin(v0)?;
    let spokes: Vec<EdgeId> = self.pool.pinwheel(e0).collect();

    // (a) The segment is already an edge.
    for &s in spokes.iter() {
      if self.pool.dest(s) == Some(v1) {
        self.mark_constrained(s, ci, defines_area);
        return Ok(());
      }
    }

    // (b) An existing edge runs collinearly into the segment: constrain it
    // and continue from its far endpoint.
    for &s in spokes.iter() {
      let w = match self.pool.dest(s) {
        Some(w) => w,
        None => continue,
      };
      let (wx, wy) = self.coords(w);
      let h = self.predicates.half_plane(x0, y0, x1, y1, wx, wy);
      if h.abs() <= self.vertex_tolerance * seg_len {
        let t = ((wx - x0) * (x1 - x0) + (wy - y0) * (y1 - y0)) / (seg_len * seg_len);
        if t > 0.0 && t < 1.0 {
          self.mark_constrained(s, ci, defines_area);
          path.insert(i + 1, w);
          return Ok(());
        }
      }
    }

    // (c) Carve a corridor from v0 toward v1, collecting the cavity
    // boundaries on either side of the constraint line.
    let mut found = None;
    for &s in spokes.iter() {
      let f = self.pool.forward(s);
      let g = self.pool.forward(f);
      let a = match self.pool.dest(s) {
        Some(a) => a,
        None => continue,
      };
      let b = match self.pool.origin(g) {
        Some(b) => b,
        None => continue,
      };
      let (ax, ay) = self.coords(a);
      let (bx, by) = self.coords(b);
      let ha = self.predicates.half_plane(x0, y0, x1, y1, ax, ay);
      let hb = self.predicates.half_plane(x0, y0, x1, y1, bx, by);
      if ha < 0.0 && hb > 0.0 {
        // The ray exits the face between them; the opposite edge straddles.
        found = Some((f.dual(), g, s));
        break;
      }
    }
    let (mut cur, left_first, right_first) = match found {
      Some(f) => f,
      None => return Err(Error::InvariantViolation),
    };
    // Boundary halves with the carved corridor on their left. The left
    // chain is collected from v0 outward and reversed when the ring is
    // assembled.
    let mut left_rev = vec![left_first];
    let mut right_chain = vec![right_first];
    let mut target = v1;
    let limit = 4 * self.pool.len() + 64;
    let mut steps = 0;
    loop {
      steps += 1;
      if steps > limit {
        return Err(Error::InvariantViolation);
      }
      let e1 = self.pool.forward(cur);
      let e2 = self.pool.forward(e1);
      let t = match self.pool.origin(e2) {
        Some(t) => t,
        None => return Err(Error::InvariantViolation),
      };
      if t == v1 {
        left_rev.push(e2);
        right_chain.push(e1);
        self.pool.deallocate(cur);
        break;
      }
      let (tx, ty) = self.coords(t);
      let h = self.predicates.half_plane(x0, y0, x1, y1, tx, ty);
      if h == 0.0 || h.abs() <= self.vertex_tolerance * seg_len {
        // A vertex sits on the segment: seal the corridor here and let the
        // caller continue with the remaining sub-segment.
        left_rev.push(e2);
        right_chain.push(e1);
        self.pool.deallocate(cur);
        path.insert(i + 1, t);
        target = t;
        break;
      }
      if h > 0.0 {
        left_rev.push(e2);
        self.pool.deallocate(cur);
        cur = e1.dual();
      } else {
        right_chain.push(e1);
        self.pool.deallocate(cur);
        cur = e2.dual();
      }
    }

    let cv = self.pool.allocate(Some(v0), Some(target));
    self.mark_constrained(cv, ci, defines_area);

    let mut left_ring = Vec::with_capacity(left_rev.len() + 1);
    left_ring.push(cv);
    left_ring.extend(left_rev.iter().rev());
    self.link_ring(&left_ring);
    let mut created = self.fill_ring(&left_ring, CavityScore::Area)?;

    let mut right_ring = Vec::with_capacity(right_chain.len() + 1);
    right_ring.push(cv.dual());
    right_ring.extend(right_chain.iter());
    self.link_ring(&right_ring);
    created.extend(self.fill_ring(&right_ring, CavityScore::Area)?);

    self.search_edge = Some(cv);
    // The area fill is not Delaunay by itself; a bounded flip pass restores
    // the criterion on the new interior diagonals.
    self.lawson_restore(created);
    Ok(())
  }

  fn link_ring(&mut self, ring: &[EdgeId]) {
    for i in 0..ring.len() {
      let next = ring[(i + 1) % ring.len()];
      self.pool.set_forward(ring[i], next);
    }
  }

  /// Lawson flip pass over the given seed edges, propagating to neighbors.
  /// Constrained edges are never flipped.
  pub(crate) fn lawson_restore(&mut self, seeds: Vec<EdgeId>) {
    let mut queue: VecDeque<EdgeId> = seeds.into();
    let limit = 32 * (queue.len() + 8) + 4 * self.pool.len();
    let mut steps = 0;
    while let Some(e) = queue.pop_front() {
      steps += 1;
      if steps > limit {
        warn!("flip restoration budget exhausted");
        break;
      }
      if !self.pool.is_live(e) || self.pool.is_constrained(e) {
        continue;
      }
      let (a, b) = match (self.pool.origin(e), self.pool.dest(e)) {
        (Some(a), Some(b)) => (a, b),
        _ => continue,
      };
      let e1 = self.pool.forward(e);
      let e2 = self.pool.forward(e1);
      let d = e.dual();
      let d1 = self.pool.forward(d);
      let d2 = self.pool.forward(d1);
      let c = match self.pool.origin(e2) {
        Some(c) => c,
        None => continue,
      };
      let w = match self.pool.origin(d2) {
        Some(w) => w,
        None => continue,
      };
      let (ax, ay) = self.coords(a);
      let (bx, by) = self.coords(b);
      let (cx, cy) = self.coords(c);
      let (wx, wy) = self.coords(w);
      if self.predicates.in_circle(ax, ay, bx, by, cx, cy, wx, wy) <= 0.0 {
        continue;
      }
      // Flip a-b to w-c in place; the pair keeps its slot and flags.
      self.pool.set_origin(e, Some(w));
      self.pool.set_origin(d, Some(c));
      self.pool.set_forward(e, e2);
      self.pool.set_forward(e2, d1);
      self.pool.set_forward(d1, e);
      self.pool.set_forward(d, d2);
      self.pool.set_forward(d2, e1);
      self.pool.set_forward(e1, d);
      queue.push_back(e1);
      queue.push_back(e2);
      queue.push_back(d1);
      queue.push_back(d2);
    }
  }

  /// Subdivides constrained edges that violate the local Delaunay
  /// criterion, inserting synthetic midpoints until the triangulation is
  /// conforming.
  fn restore_conformity(&mut self) -> Result<()> {
    for _ in 0..MAX_CONFORMITY_PASSES {
      let mut queue: VecDeque<EdgeId> = self
        .pool
        .iter()
        .filter(|&e| self.pool.is_constrained(e))
        .collect();
      let mut split_any = false;
      while let Some(e) = queue.pop_front() {
        if !self.pool.is_live(e) || !self.pool.is_constrained(e) {
          continue;
        }
        if self.constrained_edge_violation(e) {
          let (am, mb, wings) = self.split_constrained_edge(e)?;
          split_any = true;
          self.lawson_restore(wings.to_vec());
          queue.push_back(am);
          queue.push_back(mb);
        }
      }
      if !split_any {
        return Ok(());
      }
    }
    warn!("conformity restoration did not converge");
    Ok(())
  }

  fn constrained_edge_violation(&self, e: EdgeId) -> bool {
    let (a, b) = match (self.pool.origin(e), self.pool.dest(e)) {
      (Some(a), Some(b)) => (a, b),
      _ => return false,
    };
    let c = match self.pool.origin(self.pool.reverse(e)) {
      Some(c) => c,
      None => return false,
    };
    let w = match self.pool.origin(self.pool.reverse(e.dual())) {
      Some(w) => w,
      None => return false,
    };
    let (ax, ay) = self.coords(a);
    let (bx, by) = self.coords(b);
    let (cx, cy) = self.coords(c);
    let (wx, wy) = self.coords(w);
    self.predicates.in_circle(ax, ay, bx, by, cx, cy, wx, wy) > 0.0
  }

  /// Replaces a constrained edge a-b with two constrained halves meeting at
  /// a synthetic midpoint, creating four triangles from the former two.
  fn split_constrained_edge(&mut self, e: EdgeId) -> Result<(EdgeId, EdgeId, [EdgeId; 4])> {
    let a = self.pool.origin(e).ok_or(Error::InvariantViolation)?;
    let b = self.pool.dest(e).ok_or(Error::InvariantViolation)?;
    let e1 = self.pool.forward(e);
    let e2 = self.pool.forward(e1);
    let d = e.dual();
    let d1 = self.pool.forward(d);
    let d2 = self.pool.forward(d1);
    let c = self.pool.origin(e2).ok_or(Error::InvariantViolation)?;
    let w = self.pool.origin(d2).ok_or(Error::InvariantViolation)?;

    let ci = self
      .pool
      .constraint_index(e)
      .ok_or(Error::InvariantViolation)?;
    let area_left_of_ab = if e.is_base() {
      self.pool.is_area_on_base_side(e)
    } else {
      !self.pool.is_area_on_base_side(e)
    };
    let defines_area = self
      .constraints
      .get(ci)
      .map_or(false, |c| c.is_polygon() && c.defines_area());

    let (ax, ay) = self.coords(a);
    let (bx, by) = self.coords(b);
    let za = self.vertex(a).z();
    let zb = self.vertex(b).z();
    let mut midpoint = Vertex::with_id(
      0.5 * (ax + bx),
      0.5 * (ay + by),
      0.5 * (za + zb),
      usize::MAX - self.synthetic_count,
    );
    midpoint.set_synthetic(true);
    midpoint.set_constraint_member(true);
    self.synthetic_count += 1;
    let m = self.alloc_vertex(MeshVertex::Single(midpoint));

    self.pool.deallocate(e);
    let am = self.pool.allocate(Some(a), Some(m));
    let mb = self.pool.allocate(Some(m), Some(b));
    let cm = self.pool.allocate(Some(c), Some(m));
    let wm = self.pool.allocate(Some(w), Some(m));

    self.pool.set_forward(am, cm.dual());
    self.pool.set_forward(cm.dual(), e2);
    self.pool.set_forward(e2, am);

    self.pool.set_forward(mb, e1);
    self.pool.set_forward(e1, cm);
    self.pool.set_forward(cm, mb);

    self.pool.set_forward(am.dual(), d1);
    self.pool.set_forward(d1, wm);
    self.pool.set_forward(wm, am.dual());

    self.pool.set_forward(mb.dual(), wm.dual());
    self.pool.set_forward(wm.dual(), d2);
    self.pool.set_forward(d2, mb.dual());

    self.pool.set_constrained(am, ci);
    self.pool.set_constrained(mb, ci);
    if defines_area {
      // Both new base halves run in the a->b sense.
      self.pool.set_area_on_base_side(am, area_left_of_ab);
      self.pool.set_area_on_base_side(mb, area_left_of_ab);
    }
    self.search_edge = Some(am);
    Ok((am, mb, [e1, e2, d1, d2]))
  }

  /// Propagates the area-member flag from each area-defining constraint
  /// edge across unconstrained edges, tagging the interior triangles with
  /// the owning constraint.
  fn flood_fill_areas(&mut self) {
    let area_indices: Vec<usize> = self
      .constraints
      .iter()
      .enumerate()
      .filter(|(_, c)| c.is_polygon() && c.defines_area())
      .map(|(i, _)| i)
      .collect();
    for ci in area_indices {
      let seeds: Vec<EdgeId> = self
        .pool
        .iter()
        .filter(|&e| self.pool.is_constrained(e) && self.pool.constraint_index(e) == Some(ci))
        .map(|e| {
          if self.pool.is_area_on_base_side(e) {
            e
          } else {
            e.dual()
          }
        })
        .collect();
      let mut stack = seeds;
      while let Some(h) = stack.pop() {
        if self.face_is_ghost(h) {
          continue;
        }
        let mut e = self.pool.forward(h);
        while e != h {
          if !self.pool.is_constrained(e) && !self.pool.is_area_member(e) {
            self.pool.set_area_member(e, ci);
            stack.push(e.dual());
          }
          e = self.pool.forward(e);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::data::{Constraint, Vertex};
  use crate::{Error, IncrementalTin};

  fn v(x: f64, y: f64) -> Vertex {
    Vertex::new(x, y, 0.0)
  }

  fn square_tin() -> IncrementalTin {
    let mut tin = IncrementalTin::new(1.0);
    for (i, &(x, y)) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
      .iter()
      .enumerate()
    {
      tin.add(Vertex::with_id(x, y, 0.0, i)).unwrap();
    }
    tin
  }

  fn constrained_edge_count(tin: &IncrementalTin) -> usize {
    tin.edges().iter().filter(|e| e.is_constrained()).count()
  }

  #[test]
  fn diagonal_constraint_on_square() {
    let mut tin = square_tin();
    tin
      .add_constraints(
        vec![Constraint::linear(vec![v(0.0, 0.0), v(1.0, 1.0)])],
        false,
      )
      .unwrap();
    tin.check_topology().unwrap();
    assert_eq!(tin.count_triangles().count, 2);
    assert_eq!(constrained_edge_count(&tin), 1);
    let diagonal = tin
      .edges()
      .into_iter()
      .find(|e| e.is_constrained())
      .unwrap();
    let a = diagonal.a().unwrap();
    let b = diagonal.b().unwrap();
    let ends = [(a.x(), a.y()), (b.x(), b.y())];
    assert!(ends.contains(&(0.0, 0.0)));
    assert!(ends.contains(&(1.0, 1.0)));
  }

  #[test]
  fn mesh_locks_after_constraints() {
    let mut tin = square_tin();
    tin
      .add_constraints(
        vec![Constraint::linear(vec![v(0.0, 0.0), v(1.0, 1.0)])],
        false,
      )
      .unwrap();
    assert_eq!(tin.add(v(0.25, 0.1)), Err(Error::Locked));
    assert_eq!(
      tin.add_constraints(
        vec![Constraint::linear(vec![v(1.0, 0.0), v(0.0, 1.0)])],
        false
      ),
      Err(Error::Locked)
    );
  }

  #[test]
  fn too_many_constraints_overflow() {
    let mut tin = square_tin();
    // Constructing 2^20 real constraints is absurd; a cheap stand-in list
    // of empty linear constraints exercises the bound.
    let many: Vec<Constraint> = (0..(1 << 20) + 1)
      .map(|_| Constraint::linear(Vec::new()))
      .collect();
    assert_eq!(
      tin.add_constraints(many, false),
      Err(Error::ConstraintOverflow)
    );
  }

  #[test]
  fn segment_through_many_faces() {
    let mut tin = IncrementalTin::new(1.0);
    let mut id = 0;
    for i in 0..6 {
      for j in 0..6 {
        tin
          .add(Vertex::with_id(i as f64, j as f64, 0.0, id))
          .unwrap();
        id += 1;
      }
    }
    // The diagonal passes through the collinear grid vertices, which are
    // absorbed into the constraint as intermediate points.
    tin
      .add_constraints(
        vec![Constraint::linear(vec![v(0.0, 0.0), v(5.0, 5.0)])],
        false,
      )
      .unwrap();
    tin.check_topology().unwrap();
    assert_eq!(constrained_edge_count(&tin), 5);
    let n = tin.vertices().len();
    let hull = tin.perimeter().len();
    assert_eq!(tin.count_triangles().count, 2 * n - 2 - hull);
  }

  #[test]
  fn skew_constraint_carves_cavities() {
    let mut tin = IncrementalTin::new(1.0);
    let mut id = 0;
    for i in 0..7 {
      for j in 0..4 {
        tin
          .add(Vertex::with_id(i as f64, j as f64 + 0.1 * i as f64, 0.0, id))
          .unwrap();
        id += 1;
      }
    }
    tin
      .add_constraints(
        vec![Constraint::linear(vec![v(0.0, 1.0), v(6.0, 2.6)])],
        false,
      )
      .unwrap();
    tin.check_topology().unwrap();
    assert!(constrained_edge_count(&tin) >= 1);
    let n = tin.vertices().len();
    let hull = tin.perimeter().len();
    assert_eq!(tin.count_triangles().count, 2 * n - 2 - hull);
  }

  #[test]
  fn conformity_subdivides_violating_edges() {
    let mut tin = IncrementalTin::new(1.0);
    let points = [
      (0.0, 0.0),
      (4.0, 0.0),
      (2.0, 0.35),
      (2.0, -0.35),
      (-1.0, 2.0),
      (5.0, 2.0),
    ];
    for (i, &(x, y)) in points.iter().enumerate() {
      tin.add(Vertex::with_id(x, y, 0.0, i)).unwrap();
    }
    tin
      .add_constraints(
        vec![Constraint::linear(vec![v(0.0, 0.0), v(4.0, 0.0)])],
        true,
      )
      .unwrap();
    tin.check_topology().unwrap();
    // The long flat edge fails the in-circle test against the nearby
    // vertices and must have been subdivided.
    assert!(tin.synthetic_vertex_count() > 0);
    assert!(constrained_edge_count(&tin) >= 2);
    for e in tin.edges() {
      if e.is_constrained() {
        assert_eq!(e.constraint_index(), Some(0));
      }
    }
  }

  #[test]
  fn polygon_constraint_floods_area() {
    let mut tin = IncrementalTin::new(1.0);
    let mut id = 0;
    for i in 0..5 {
      for j in 0..5 {
        tin
          .add(Vertex::with_id(i as f64, j as f64, 0.0, id))
          .unwrap();
        id += 1;
      }
    }
    let ring = vec![v(1.0, 1.0), v(3.0, 1.0), v(3.0, 3.0), v(1.0, 3.0)];
    tin
      .add_constraints(vec![Constraint::polygon(ring, true)], false)
      .unwrap();
    tin.check_topology().unwrap();
    assert_eq!(constrained_edge_count(&tin), 8);
    let tagged: Vec<_> = tin
      .edges()
      .into_iter()
      .filter(|e| e.is_area_member() && !e.is_constrained())
      .collect();
    // The interior of the 2x2 ring holds the center vertex and the interior
    // diagonals; every tagged edge lies strictly inside the ring.
    assert!(!tagged.is_empty());
    for e in tagged {
      let a = e.a().unwrap();
      let b = e.b().unwrap();
      for p in [(a.x(), a.y()), (b.x(), b.y())].iter() {
        assert!(p.0 >= 1.0 && p.0 <= 3.0 && p.1 >= 1.0 && p.1 <= 3.0);
        assert_eq!(e.constraint_index(), Some(0));
      }
    }
  }
}
