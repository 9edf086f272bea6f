use crate::data::{
  Constraint, EdgeId, EdgePool, MeshVertex, Vertex, VertexId, VertexMergerGroup, ZResolution,
};
use crate::predicates::Predicates;
use crate::Error;
use claims::debug_assert_ok;
use log::debug;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::fmt;

type Result<T> = std::result::Result<T, Error>;

// Vertices closer together than spacing * MERGE_TOLERANCE_FACTOR collapse
// into a merger group instead of producing a sliver triangle.
const MERGE_TOLERANCE_FACTOR: f64 = 1.0e-6;

// How many leading vertices the bootstrap scans exhaustively before falling
// back to random triples.
const SEED_SCAN_LIMIT: usize = 48;
const SEED_RANDOM_TRIALS: usize = 256;

const DEFAULT_POLL_INTERVAL: usize = 500;

/// Callback polled between vertex insertions during bulk adds. Returning
/// false requests cancellation; the engine finishes the vertex in flight and
/// exits with the mesh in a consistent state.
pub trait ProgressMonitor {
  fn progress(&mut self, completed: usize, total: usize) -> bool;
}

/// Census of the triangles in a mesh, with area statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleCount {
  pub count: usize,
  pub area_min: f64,
  pub area_max: f64,
  pub area_mean: f64,
  pub area_std_dev: f64,
  pub area_sum: f64,
}

/// An incrementally built Delaunay triangulation over a planar point set,
/// optionally constrained.
///
/// The mesh is a quad-edge structure. The unbounded face is modeled by
/// ghost edges whose origin is the virtual vertex at infinity (a None
/// origin); the ghost triangles let hull growth reuse the ordinary
/// insertion machinery. A single instance owns its edge pool and vertex
/// arena and is not safe for concurrent mutation.
pub struct IncrementalTin {
  pub(crate) pool: EdgePool,
  pub(crate) verts: Vec<Option<MeshVertex>>,
  pub(crate) predicates: Predicates,
  nominal_point_spacing: f64,
  pub(crate) vertex_tolerance: f64,
  pub(crate) vertex_tolerance_sq: f64,
  pub(crate) search_edge: Option<EdgeId>,
  pub(crate) rng: SmallRng,
  pub(crate) bootstrapped: bool,
  pub(crate) locked: bool,
  pub(crate) disposed: bool,
  pub(crate) buffer: Vec<Vertex>,
  pub(crate) constraints: Vec<Constraint>,
  pub(crate) synthetic_count: usize,
  pub(crate) merger_rule: ZResolution,
  max_edge_replacements: usize,
  progress_poll_interval: usize,
}

impl IncrementalTin {
  pub fn new(nominal_point_spacing: f64) -> IncrementalTin {
    let spacing = if nominal_point_spacing > 0.0 && nominal_point_spacing.is_finite() {
      nominal_point_spacing
    } else {
      1.0
    };
    let tolerance = spacing * MERGE_TOLERANCE_FACTOR;
    IncrementalTin {
      pool: EdgePool::new(),
      verts: Vec::new(),
      predicates: Predicates::new(spacing),
      nominal_point_spacing: spacing,
      vertex_tolerance: tolerance,
      vertex_tolerance_sq: tolerance * tolerance,
      search_edge: None,
      rng: SmallRng::seed_from_u64(0x5eed_1e55_u64),
      bootstrapped: false,
      locked: false,
      disposed: false,
      buffer: Vec::new(),
      constraints: Vec::new(),
      synthetic_count: 0,
      merger_rule: ZResolution::default(),
      max_edge_replacements: 0,
      progress_poll_interval: DEFAULT_POLL_INTERVAL,
    }
  }

  pub fn nominal_point_spacing(&self) -> f64 {
    self.nominal_point_spacing
  }

  pub fn is_bootstrapped(&self) -> bool {
    self.bootstrapped
  }

  /// Rule applied when coincident vertices are merged into a group.
  pub fn set_merger_rule(&mut self, rule: ZResolution) {
    self.merger_rule = rule;
  }

  pub fn set_progress_poll_interval(&mut self, interval: usize) {
    self.progress_poll_interval = interval.max(1);
  }

  /// Largest number of edges replaced by a single insertion so far.
  pub fn max_edge_replacements(&self) -> usize {
    self.max_edge_replacements
  }

  pub fn synthetic_vertex_count(&self) -> usize {
    self.synthetic_count
  }

  pub fn constraints(&self) -> &[Constraint] {
    &self.constraints
  }

  /// Inserts a vertex. Returns whether the mesh is bootstrapped afterwards;
  /// vertices arriving before a viable seed triangle exists are buffered.
  pub fn add(&mut self, v: Vertex) -> Result<bool> {
    self.check_mutable()?;
    if !self.bootstrapped {
      self.buffer.push(v);
      self.try_bootstrap()?;
      return Ok(self.bootstrapped);
    }
    self.insert_vertex(v)?;
    debug_assert_ok!(self.check_topology());
    Ok(true)
  }

  /// Bulk insertion with an optional progress monitor, polled every
  /// `progress_poll_interval` vertices.
  pub fn add_all(
    &mut self,
    vertices: Vec<Vertex>,
    mut monitor: Option<&mut dyn ProgressMonitor>,
  ) -> Result<bool> {
    self.check_mutable()?;
    let total = vertices.len();
    debug!("bulk insertion of {} vertices", total);
    for (done, v) in vertices.into_iter().enumerate() {
      if !self.bootstrapped {
        self.buffer.push(v);
        self.try_bootstrap()?;
      } else {
        self.insert_vertex(v)?;
      }
      if (done + 1) % self.progress_poll_interval == 0 {
        if let Some(m) = monitor.as_mut() {
          if !m.progress(done + 1, total) {
            debug!("bulk insertion cancelled after {} of {}", done + 1, total);
            break;
          }
        }
      }
    }
    debug_assert_ok!(self.check_topology());
    Ok(self.bootstrapped)
  }

  /// Releases the mesh. All subsequent operations fail with
  /// `Error::Disposed`.
  pub fn dispose(&mut self) {
    self.reset();
    self.disposed = true;
  }

  /// Resets the mesh for reuse without releasing pool capacity.
  pub fn clear(&mut self) {
    if !self.disposed {
      self.reset();
    }
  }

  fn reset(&mut self) {
    self.pool.clear();
    self.verts.clear();
    self.buffer.clear();
    self.constraints.clear();
    self.search_edge = None;
    self.bootstrapped = false;
    self.locked = false;
    self.synthetic_count = 0;
    self.max_edge_replacements = 0;
  }

  pub(crate) fn check_mutable(&self) -> Result<()> {
    if self.disposed {
      return Err(Error::Disposed);
    }
    if self.locked {
      return Err(Error::Locked);
    }
    Ok(())
  }

  // -------------------------------------------------------------------
  // Vertex arena

  pub(crate) fn alloc_vertex(&mut self, occupant: MeshVertex) -> VertexId {
    self.verts.push(Some(occupant));
    VertexId(self.verts.len() - 1)
  }

  pub(crate) fn vertex(&self, v: VertexId) -> &MeshVertex {
    match self.verts[v.0].as_ref() {
      Some(occupant) => occupant,
      None => panic!("dead vertex slot {:?}", v),
    }
  }

  pub(crate) fn coords(&self, v: VertexId) -> (f64, f64) {
    let occupant = self.vertex(v);
    (occupant.x(), occupant.y())
  }

  // -------------------------------------------------------------------
  // Bootstrap

  fn try_bootstrap(&mut self) -> Result<()> {
    if self.buffer.len() < 3 {
      return Ok(());
    }
    let triple = match self.select_seed_triple() {
      Some(t) => t,
      None => return Ok(()),
    };
    let buffer = std::mem::replace(&mut self.buffer, Vec::new());
    let [i, j, k] = triple;
    let a = self.alloc_vertex(MeshVertex::Single(buffer[i]));
    let b = self.alloc_vertex(MeshVertex::Single(buffer[j]));
    let c = self.alloc_vertex(MeshVertex::Single(buffer[k]));
    self.build_seed(a, b, c);
    self.bootstrapped = true;
    debug!("bootstrapped from buffered vertices {} {} {}", i, j, k);
    for (at, v) in buffer.into_iter().enumerate() {
      if at != i && at != j && at != k {
        self.insert_vertex(v)?;
      }
    }
    debug_assert_ok!(self.check_topology());
    Ok(())
  }

  /// Scans the buffered vertices for a triple solid enough to seed the
  /// mesh, returning it in counter-clockwise order.
  fn select_seed_triple(&mut self) -> Option<[usize; 3]> {
    let n = self.buffer.len();
    let threshold = self.predicates.half_plane_threshold();
    let score = |p: &Vertex, q: &Vertex, r: &Vertex| {
      (q.x() - p.x()) * (r.y() - p.y()) - (q.y() - p.y()) * (r.x() - p.x())
    };
    let mut best: Option<([usize; 3], f64)> = None;
    let limit = n.min(SEED_SCAN_LIMIT);
    for i in 0..limit {
      for j in (i + 1)..limit {
        for k in (j + 1)..limit {
          let h = score(&self.buffer[i], &self.buffer[j], &self.buffer[k]);
          if h.abs() > threshold && best.map_or(true, |(_, hb)| h.abs() > hb) {
            best = Some(([i, j, k], h.abs()));
            if h.abs() >= self.nominal_point_spacing * self.nominal_point_spacing {
              return Some(self.orient_triple([i, j, k], h));
            }
          }
        }
      }
    }
    if best.is_none() && n > SEED_SCAN_LIMIT {
      for _ in 0..SEED_RANDOM_TRIALS {
        let i = self.rng.gen_range(0..n);
        let j = self.rng.gen_range(0..n);
        let k = self.rng.gen_range(0..n);
        if i == j || j == k || i == k {
          continue;
        }
        let h = score(&self.buffer[i], &self.buffer[j], &self.buffer[k]);
        if h.abs() > threshold {
          return Some(self.orient_triple([i, j, k], h));
        }
      }
    }
    best.map(|(t, _)| {
      let h = score(&self.buffer[t[0]], &self.buffer[t[1]], &self.buffer[t[2]]);
      self.orient_triple(t, h)
    })
  }

  fn orient_triple(&self, t: [usize; 3], h: f64) -> [usize; 3] {
    if h > 0.0 {
      t
    } else {
      [t[0], t[2], t[1]]
    }
  }

  /// Builds the seed mesh: the counter-clockwise triangle (a, b, c), plus
  /// three ghost triangles closing the hull to the virtual vertex at
  /// infinity.
  fn build_seed(&mut self, a: VertexId, b: VertexId, c: VertexId) {
    let eab = self.pool.allocate(Some(a), Some(b));
    let ebc = self.pool.allocate(Some(b), Some(c));
    let eca = self.pool.allocate(Some(c), Some(a));
    let ga = self.pool.allocate(Some(a), None);
    let gb = self.pool.allocate(Some(b), None);
    let gc = self.pool.allocate(Some(c), None);

    self.pool.set_forward(eab, ebc);
    self.pool.set_forward(ebc, eca);
    self.pool.set_forward(eca, eab);

    self.pool.set_forward(eab.dual(), ga);
    self.pool.set_forward(ga, gb.dual());
    self.pool.set_forward(gb.dual(), eab.dual());

    self.pool.set_forward(ebc.dual(), gb);
    self.pool.set_forward(gb, gc.dual());
    self.pool.set_forward(gc.dual(), ebc.dual());

    self.pool.set_forward(eca.dual(), gc);
    self.pool.set_forward(gc, ga.dual());
    self.pool.set_forward(ga.dual(), eca.dual());

    self.search_edge = Some(eab);
  }

  // -------------------------------------------------------------------
  // Point location

  pub(crate) fn face_is_ghost(&self, e: EdgeId) -> bool {
    self.pool.is_ghost(e)
      || self.pool.is_ghost(self.pool.forward(e))
      || self.pool.is_ghost(self.pool.reverse(e))
  }

  /// Normalizes an arbitrary live edge to one with real endpoints and a
  /// real left face, stepping out of ghost territory if needed.
  fn interior_start(&self, mut e: EdgeId) -> EdgeId {
    for _ in 0..3 {
      if self.pool.origin(e).is_some() && self.pool.dest(e).is_some() {
        if self.face_is_ghost(e) {
          return e.dual();
        }
        return e;
      }
      e = self.pool.forward(e);
    }
    e
  }

  /// Stochastic Lawson walk toward (x, y).
  ///
  /// Returns an edge whose closed left triangle contains the target, or,
  /// when the target is outside the hull, an edge whose left face is the
  /// ghost triangle beyond the hull edge the target is visible from. A
  /// thresholded zero counts as inside; callers that care recheck with the
  /// vertex tolerance.
  pub(crate) fn find_enclosing(&mut self, x: f64, y: f64) -> Result<EdgeId> {
    let cached = self.search_edge.filter(|&e| self.pool.is_live(e));
    let start = match cached {
      Some(e) => e,
      None => {
        let mut pick = None;
        for _ in 0..8 {
          match self.pool.random_edge(&mut self.rng) {
            Some(e) if self.pool.origin(e).is_some() || self.pool.dest(e).is_some() => {
              pick = Some(e);
              break;
            }
            Some(_) => {}
            None => break,
          }
        }
        pick.ok_or(Error::InvariantViolation)?
      }
    };
    let mut e = self.interior_start(start);
    let limit = 4 * self.pool.len() + 64;
    for _ in 0..limit {
      let a = match self.pool.origin(e) {
        Some(v) => v,
        None => return Err(Error::InvariantViolation),
      };
      let b = match self.pool.dest(e) {
        Some(v) => v,
        None => return Err(Error::InvariantViolation),
      };
      let (ax, ay) = self.coords(a);
      let (bx, by) = self.coords(b);
      let h0 = self.predicates.half_plane(ax, ay, bx, by, x, y);
      if h0 < 0.0 {
        e = e.dual();
        if self.face_is_ghost(e) {
          self.search_edge = Some(e.dual());
          return Ok(e);
        }
        continue;
      }
      let f = self.pool.forward(e);
      let g = self.pool.forward(f);
      let c = match self.pool.origin(g) {
        Some(v) => v,
        None => return Err(Error::InvariantViolation),
      };
      let (cx, cy) = self.coords(c);
      let h1 = self.predicates.half_plane(bx, by, cx, cy, x, y);
      let h2 = self.predicates.half_plane(cx, cy, ax, ay, x, y);
      let crossing = if h1 < 0.0 && h2 < 0.0 {
        // Both edges separate the target; choose randomly, biased by the
        // magnitude of the violation, to break walk cycles.
        let w = -(h1 + h2);
        if self.rng.gen::<f64>() * w < -h1 {
          f
        } else {
          g
        }
      } else if h1 < 0.0 {
        f
      } else if h2 < 0.0 {
        g
      } else {
        self.search_edge = Some(e);
        return Ok(e);
      };
      e = crossing.dual();
      if self.face_is_ghost(e) {
        self.search_edge = Some(e.dual());
        return Ok(e);
      }
    }
    Err(Error::InvariantViolation)
  }

  /// True when (x, y) lies on or inside the convex hull of the mesh.
  pub fn is_point_inside(&mut self, x: f64, y: f64) -> bool {
    if !self.bootstrapped || self.disposed {
      return false;
    }
    match self.find_enclosing(x, y) {
      Ok(e) => !self.face_is_ghost(e),
      Err(_) => false,
    }
  }

  // -------------------------------------------------------------------
  // Insertion

  pub(crate) fn insert_vertex(&mut self, v: Vertex) -> Result<VertexId> {
    let e = self.find_enclosing(v.x(), v.y())?;
    if let Some(hit) = self.coincident_corner(e, v.x(), v.y()) {
      self.merge_vertex(hit, v);
      return Ok(hit);
    }
    self.dig_and_fill(v, e)
  }

  /// A corner of the left face of `e` within the merge tolerance of
  /// (x, y), if any.
  pub(crate) fn coincident_corner(&self, e: EdgeId, x: f64, y: f64) -> Option<VertexId> {
    let f = self.pool.forward(e);
    let g = self.pool.forward(f);
    for &edge in [e, f, g].iter() {
      if let Some(vid) = self.pool.origin(edge) {
        if self.vertex(vid).distance_sq(x, y) <= self.vertex_tolerance_sq {
          return Some(vid);
        }
      }
    }
    None
  }

  fn merge_vertex(&mut self, vid: VertexId, v: Vertex) {
    let rule = self.merger_rule;
    if let Some(occupant) = self.verts[vid.0].take() {
      let merged = match occupant {
        MeshVertex::Single(first) => {
          let mut group = VertexMergerGroup::new(first, rule);
          group.add(v);
          MeshVertex::Group(group)
        }
        MeshVertex::Group(mut group) => {
          group.add(v);
          MeshVertex::Group(group)
        }
      };
      self.verts[vid.0] = Some(merged);
    }
  }

  /// True when the face across `boundary` (the left face of its dual)
  /// should join the insertion cavity for a vertex at (x, y).
  fn far_face_encroached(&self, boundary: EdgeId, x: f64, y: f64) -> bool {
    let d = boundary.dual();
    let f = self.pool.forward(d);
    let g = self.pool.forward(f);
    let o1 = self.pool.origin(d);
    let o2 = self.pool.origin(f);
    let o3 = self.pool.origin(g);
    match (o1, o2, o3) {
      (Some(a), Some(b), Some(c)) => {
        let (ax, ay) = self.coords(a);
        let (bx, by) = self.coords(b);
        let (cx, cy) = self.coords(c);
        self.predicates.in_circle(ax, ay, bx, by, cx, cy, x, y) >= 0.0
      }
      _ => {
        // Ghost face: its "circumcircle" is the half-plane beyond the one
        // real edge of the face.
        let real = if o1.is_none() {
          f
        } else if o2.is_none() {
          g
        } else {
          d
        };
        let p = match self.pool.origin(real) {
          Some(v) => v,
          None => return false,
        };
        let q = match self.pool.dest(real) {
          Some(v) => v,
          None => return false,
        };
        let (px, py) = self.coords(p);
        let (qx, qy) = self.coords(q);
        self.predicates.in_circle_with_ghost(px, py, qx, qy, x, y) > 0.0
      }
    }
  }

  /// Bowyer-Watson insertion: grows the cavity of faces whose circumcircle
  /// contains the new vertex, then closes a pinwheel of spokes around it.
  /// The cavity boundary remains a forward-linked cycle throughout, so the
  /// dig is pure link splicing.
  fn dig_and_fill(&mut self, v: Vertex, start: EdgeId) -> Result<VertexId> {
    let x = v.x();
    let y = v.y();
    let vid = self.alloc_vertex(MeshVertex::Single(v));
    let mut cursor = start;
    let mut ring_len = 3usize;
    let mut passes = 0usize;
    let mut replaced = 0usize;
    let limit = 8 * self.pool.len() + 64;
    let mut steps = 0usize;
    loop {
      steps += 1;
      if steps > limit {
        return Err(Error::InvariantViolation);
      }
      if !self.pool.is_constrained(cursor) && self.far_face_encroached(cursor, x, y) {
        let d = cursor.dual();
        let f = self.pool.forward(d);
        let g = self.pool.forward(f);
        let prev = self.pool.reverse(cursor);
        let next = self.pool.forward(cursor);
        self.pool.set_forward(prev, f);
        self.pool.set_forward(g, next);
        self.pool.deallocate(cursor);
        replaced += 1;
        ring_len += 1;
        passes = 0;
        cursor = f;
      } else {
        cursor = self.pool.forward(cursor);
        passes += 1;
        if passes >= ring_len {
          break;
        }
      }
    }

    let mut ring = Vec::with_capacity(ring_len);
    let first = cursor;
    loop {
      ring.push(cursor);
      cursor = self.pool.forward(cursor);
      if cursor == first {
        break;
      }
    }

    let spokes: Vec<EdgeId> = ring
      .iter()
      .map(|&b| {
        let a = self.pool.origin(b);
        self.pool.allocate(a, Some(vid))
      })
      .collect();
    let n = ring.len();
    for i in 0..n {
      let b = ring[i];
      let spoke = spokes[i];
      let spoke_next = spokes[(i + 1) % n];
      self.pool.set_forward(b, spoke_next);
      self.pool.set_forward(spoke_next, spoke.dual());
      self.pool.set_forward(spoke.dual(), b);
    }

    if replaced > self.max_edge_replacements {
      self.max_edge_replacements = replaced;
    }
    for (i, &b) in ring.iter().enumerate() {
      if self.pool.origin(b).is_some() {
        self.search_edge = Some(spokes[i]);
        break;
      }
    }
    Ok(vid)
  }

  // -------------------------------------------------------------------
  // Queries

  /// Interior edges of the hull, counter-clockwise; each hull vertex
  /// appears exactly once as an origin.
  pub fn perimeter(&self) -> Vec<EdgeRef<'_>> {
    let mut out = Vec::new();
    if !self.bootstrapped {
      return out;
    }
    let mut outer = None;
    for base in self.pool.iter() {
      for &e in [base, base.dual()].iter() {
        if self.pool.origin(e).is_some() && self.pool.dest(e).is_none() {
          // e is x -> infinity; its reverse in the ghost face is the outer
          // half of a hull edge.
          outer = Some(self.pool.reverse(e));
          break;
        }
      }
      if outer.is_some() {
        break;
      }
    }
    let start = match outer {
      Some(e) => e,
      None => return out,
    };
    let mut e = start;
    loop {
      out.push(EdgeRef {
        tin: self,
        id: e.dual(),
      });
      e = self.pool.reverse(self.pool.reverse(e).dual());
      if e == start {
        break;
      }
    }
    out
  }

  /// All live edges with at least one real endpoint excluded from the
  /// ghost cycle; callers must not retain the references across mutation.
  pub fn edges(&self) -> Vec<EdgeRef<'_>> {
    self
      .pool
      .iter()
      .filter(|&e| self.pool.origin(e).is_some() && self.pool.dest(e).is_some())
      .map(|id| EdgeRef { tin: self, id })
      .collect()
  }

  pub fn edge_count(&self) -> usize {
    self.pool.len()
  }

  /// The unique occupants of the mesh, one vertex per merger group.
  pub fn vertices(&self) -> Vec<Vertex> {
    if !self.bootstrapped {
      return self.buffer.clone();
    }
    self
      .verts
      .iter()
      .filter_map(|slot| slot.as_ref().map(MeshVertex::as_vertex))
      .collect()
  }

  pub fn count_triangles(&self) -> TriangleCount {
    let mut count = 0usize;
    let mut mean = 0.0;
    let mut m2 = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for base in self.pool.iter() {
      for &e in [base, base.dual()].iter() {
        let f = self.pool.forward(e);
        let g = self.pool.forward(f);
        if e.index() > f.index() || e.index() > g.index() {
          continue;
        }
        let (a, b, c) = match (self.pool.origin(e), self.pool.origin(f), self.pool.origin(g)) {
          (Some(a), Some(b), Some(c)) => (a, b, c),
          _ => continue,
        };
        let (ax, ay) = self.coords(a);
        let (bx, by) = self.coords(b);
        let (cx, cy) = self.coords(c);
        let area = 0.5 * ((bx - ax) * (cy - ay) - (by - ay) * (cx - ax));
        count += 1;
        sum += area;
        min = min.min(area);
        max = max.max(area);
        let delta = area - mean;
        mean += delta / count as f64;
        m2 += delta * (area - mean);
      }
    }
    if count == 0 {
      return TriangleCount {
        count: 0,
        area_min: 0.0,
        area_max: 0.0,
        area_mean: 0.0,
        area_std_dev: 0.0,
        area_sum: 0.0,
      };
    }
    let variance = if count > 1 { m2 / (count - 1) as f64 } else { 0.0 };
    TriangleCount {
      count,
      area_min: min,
      area_max: max,
      area_mean: mean,
      area_std_dev: variance.sqrt(),
      area_sum: sum,
    }
  }

  // -------------------------------------------------------------------
  // Lookup helpers shared with removal and constraint processing

  /// Mesh occupant within the merge tolerance of (x, y), if present.
  pub(crate) fn find_vertex(&mut self, x: f64, y: f64) -> Option<VertexId> {
    match self.find_enclosing(x, y) {
      Ok(e) => self.coincident_corner(e, x, y),
      Err(_) => None,
    }
  }

  /// An edge whose origin is the given vertex.
  pub(crate) fn edge_with_origin(&mut self, vid: VertexId) -> Result<EdgeId> {
    let (x, y) = self.coords(vid);
    let e = self.find_enclosing(x, y)?;
    let f = self.pool.forward(e);
    let g = self.pool.forward(f);
    for &edge in [e, f, g].iter() {
      if self.pool.origin(edge) == Some(vid) {
        return Ok(edge);
      }
    }
    Err(Error::InvariantViolation)
  }

  // -------------------------------------------------------------------
  // Debug invariants

  #[cfg(debug_assertions)]
  pub(crate) fn check_topology(&self) -> Result<()> {
    for base in self.pool.iter() {
      for &e in [base, base.dual()].iter() {
        if self.pool.reverse(self.pool.forward(e)) != e {
          return Err(Error::InvariantViolation);
        }
        if self.pool.forward(self.pool.reverse(e)) != e {
          return Err(Error::InvariantViolation);
        }
        let f = self.pool.forward(e);
        let g = self.pool.forward(f);
        if self.pool.forward(g) != e {
          return Err(Error::InvariantViolation);
        }
        if self.pool.dest(e) != self.pool.origin(f) {
          return Err(Error::InvariantViolation);
        }
      }
    }
    Ok(())
  }

  #[cfg(not(debug_assertions))]
  pub(crate) fn check_topology(&self) -> Result<()> {
    Ok(())
  }

  /// Asserts the Delaunay criterion on every unconstrained interior edge.
  #[cfg(test)]
  pub(crate) fn assert_delaunay(&self) {
    for e in self.pool.iter() {
      let (a, b) = match (self.pool.origin(e), self.pool.dest(e)) {
        (Some(a), Some(b)) => (a, b),
        _ => continue,
      };
      if self.pool.is_constrained(e) {
        continue;
      }
      let c = match self.pool.origin(self.pool.reverse(e)) {
        Some(c) => c,
        None => continue,
      };
      let d = match self.pool.origin(self.pool.reverse(e.dual())) {
        Some(d) => d,
        None => continue,
      };
      let (ax, ay) = self.coords(a);
      let (bx, by) = self.coords(b);
      let (cx, cy) = self.coords(c);
      let (dx, dy) = self.coords(d);
      let h = self.predicates.in_circle(ax, ay, bx, by, cx, cy, dx, dy);
      assert!(
        h <= self.predicates.in_circle_threshold(),
        "edge {:?} violates the Delaunay criterion: {}",
        e,
        h
      );
    }
  }
}

/// A borrowed view of a live half-edge.
#[derive(Clone, Copy)]
pub struct EdgeRef<'a> {
  tin: &'a IncrementalTin,
  id: EdgeId,
}

impl<'a> EdgeRef<'a> {
  pub fn index(&self) -> usize {
    self.id.index()
  }

  /// Origin occupant; None for a ghost half-edge.
  pub fn a(&self) -> Option<&'a MeshVertex> {
    self
      .tin
      .pool
      .origin(self.id)
      .map(|vid| self.tin.vertex(vid))
  }

  pub fn b(&self) -> Option<&'a MeshVertex> {
    self
      .tin
      .pool
      .dest(self.id)
      .map(|vid| self.tin.vertex(vid))
  }

  pub fn dual(&self) -> EdgeRef<'a> {
    EdgeRef {
      tin: self.tin,
      id: self.id.dual(),
    }
  }

  pub fn forward(&self) -> EdgeRef<'a> {
    EdgeRef {
      tin: self.tin,
      id: self.tin.pool.forward(self.id),
    }
  }

  pub fn reverse(&self) -> EdgeRef<'a> {
    EdgeRef {
      tin: self.tin,
      id: self.tin.pool.reverse(self.id),
    }
  }

  pub fn is_ghost(&self) -> bool {
    self.tin.pool.origin(self.id).is_none() || self.tin.pool.dest(self.id).is_none()
  }

  pub fn is_constrained(&self) -> bool {
    self.tin.pool.is_constrained(self.id)
  }

  pub fn constraint_index(&self) -> Option<usize> {
    self.tin.pool.constraint_index(self.id)
  }

  pub fn is_area_member(&self) -> bool {
    self.tin.pool.is_area_member(self.id)
  }

  pub fn length(&self) -> f64 {
    match (self.a(), self.b()) {
      (Some(a), Some(b)) => {
        let dx = a.x() - b.x();
        let dy = a.y() - b.y();
        (dx * dx + dy * dy).sqrt()
      }
      _ => f64::NAN,
    }
  }
}

impl<'a> fmt::Debug for EdgeRef<'a> {
  fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
    write!(fmt, "{:?}", self.id)
  }
}
