use super::cavity::CavityScore;
use super::tin::IncrementalTin;
use crate::data::{EdgeId, MeshVertex, Vertex, VertexId};
use crate::Error;
use claims::debug_assert_ok;

type Result<T> = std::result::Result<T, Error>;

impl IncrementalTin {
  /// Removes a vertex from the mesh.
  ///
  /// A member of a merger group simply leaves the group; the triangulation
  /// changes only when the last member goes. Returns false when no occupant
  /// lies within the merge tolerance of the vertex.
  pub fn remove(&mut self, v: &Vertex) -> Result<bool> {
    self.check_mutable()?;
    if !self.bootstrapped {
      let at = self
        .buffer
        .iter()
        .position(|b| b.id() == v.id() && b.distance_sq(v.x(), v.y()) <= self.vertex_tolerance_sq)
        .or_else(|| {
          self
            .buffer
            .iter()
            .position(|b| b.distance_sq(v.x(), v.y()) <= self.vertex_tolerance_sq)
        });
      return Ok(match at {
        Some(at) => {
          self.buffer.remove(at);
          true
        }
        None => false,
      });
    }
    let vid = match self.find_vertex(v.x(), v.y()) {
      Some(vid) => vid,
      None => return Ok(false),
    };
    if let Some(MeshVertex::Group(_)) = self.verts[vid.0] {
      return self.remove_from_group(vid, v);
    }
    self.remove_occupant(vid)
  }

  fn remove_from_group(&mut self, vid: VertexId, v: &Vertex) -> Result<bool> {
    let occupant = match self.verts[vid.0].take() {
      Some(MeshVertex::Group(group)) => group,
      other => {
        self.verts[vid.0] = other;
        return Err(Error::InvariantViolation);
      }
    };
    let mut group = occupant;
    if group.len() <= 1 {
      self.verts[vid.0] = Some(MeshVertex::Group(group));
      return self.remove_occupant(vid);
    }
    let removed = group.remove(v.id());
    self.verts[vid.0] = if group.len() == 1 {
      Some(MeshVertex::Single(group.into_single()))
    } else {
      Some(MeshVertex::Group(group))
    };
    Ok(removed)
  }

  fn remove_occupant(&mut self, vid: VertexId) -> Result<bool> {
    let occupants = self.verts.iter().filter(|slot| slot.is_some()).count();
    if occupants <= 3 {
      // Too few vertices left for a triangulation; fall back to the
      // pre-bootstrap buffer.
      let survivors: Vec<Vertex> = self
        .verts
        .iter()
        .enumerate()
        .filter(|&(at, slot)| at != vid.0 && slot.is_some())
        .filter_map(|(_, slot)| slot.as_ref().map(MeshVertex::as_vertex))
        .collect();
      self.pool.clear();
      self.verts.clear();
      self.search_edge = None;
      self.bootstrapped = false;
      self.buffer = survivors;
      return Ok(true);
    }
    self.devillers_removal(vid)?;
    Ok(true)
  }

  /// Devillers removal: cavitate the star of the vertex, then refill the
  /// star polygon by closing ears in order of their power score.
  fn devillers_removal(&mut self, vid: VertexId) -> Result<()> {
    let (x, y) = self.coords(vid);
    let e0 = self.edge_with_origin(vid)?;
    let spokes: Vec<EdgeId> = self.pool.pinwheel(e0).collect();
    let m = spokes.len();
    if m < 3 {
      return Err(Error::InvariantViolation);
    }
    // The link of the vertex: the edge opposite the hub in each face of
    // the star. Re-chain them into the cavity boundary cycle before the
    // spokes disappear.
    let ring_edges: Vec<EdgeId> = spokes.iter().map(|&s| self.pool.forward(s)).collect();
    for i in 0..m {
      let to = ring_edges[(i + m - 1) % m];
      self.pool.set_forward(ring_edges[i], to);
    }
    for &s in spokes.iter() {
      self.pool.deallocate(s);
    }
    self.search_edge = Some(ring_edges[0]);

    let mut ring = Vec::with_capacity(m);
    let mut e = ring_edges[0];
    loop {
      ring.push(e);
      e = self.pool.forward(e);
      if e == ring_edges[0] {
        break;
      }
    }
    if ring.len() != m {
      return Err(Error::InvariantViolation);
    }
    self.fill_ring(&ring, CavityScore::Devillers { x, y })?;
    self.verts[vid.0] = None;
    debug_assert_ok!(self.check_topology());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use crate::data::{Vertex, ZResolution};
  use crate::IncrementalTin;
  use rand::rngs::SmallRng;
  use rand::{Rng, SeedableRng};

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

  #[test]
  fn insert_then_remove_restores_counts() {
    let mut tin = square_tin();
    let before = tin.count_triangles();
    let center = Vertex::with_id(0.5, 0.5, 0.0, 9);
    tin.add(center).unwrap();
    assert_eq!(tin.count_triangles().count, 4);
    assert!(tin.remove(&center).unwrap());
    let after = tin.count_triangles();
    assert_eq!(before.count, after.count);
    assert!((before.area_sum - after.area_sum).abs() < 1.0e-12);
    assert_eq!(tin.vertices().len(), 4);
    tin.check_topology().unwrap();
  }

  #[test]
  fn remove_missing_vertex_is_ignored() {
    let mut tin = square_tin();
    assert!(!tin.remove(&v(0.25, 0.4)).unwrap());
    assert_eq!(tin.count_triangles().count, 2);
  }

  #[test]
  fn remove_hull_vertex() {
    let mut tin = square_tin();
    tin.add(Vertex::with_id(0.5, 0.5, 0.0, 4)).unwrap();
    // Removing the corner leaves the center sitting on the new hull edge,
    // so it stays a (collinear) hull vertex.
    assert!(tin.remove(&Vertex::with_id(1.0, 1.0, 0.0, 2)).unwrap());
    tin.check_topology().unwrap();
    assert_eq!(tin.vertices().len(), 4);
    let hull = tin.perimeter().len();
    assert_eq!(hull, 4);
    assert_eq!(tin.count_triangles().count, 2 * 4 - 2 - hull);
  }

  #[test]
  fn merger_member_leaves_group_first() {
    let mut tin = square_tin();
    tin.set_merger_rule(ZResolution::Mean);
    let dup = Vertex::with_id(1.0, 0.0, 6.0, 8);
    tin.add(dup).unwrap();
    assert_eq!(tin.vertices().len(), 4);
    // Removing the duplicate only shrinks the group.
    assert!(tin.remove(&dup).unwrap());
    assert_eq!(tin.vertices().len(), 4);
    assert_eq!(tin.count_triangles().count, 2);
    // Removing the survivor cavitates.
    assert!(tin.remove(&Vertex::with_id(1.0, 0.0, 0.0, 1)).unwrap());
    assert_eq!(tin.vertices().len(), 3);
    tin.check_topology().unwrap();
  }

  #[test]
  fn removal_keeps_delaunay_property() {
    let mut tin = IncrementalTin::new(0.1);
    let mut rng = SmallRng::seed_from_u64(99);
    let mut points = Vec::new();
    for i in 0..120 {
      points.push(Vertex::with_id(rng.gen::<f64>(), rng.gen::<f64>(), 0.0, i));
    }
    tin.add_all(points.clone(), None).unwrap();
    for target in points.iter().take(30) {
      assert!(tin.remove(target).unwrap());
      tin.check_topology().unwrap();
    }
    assert_eq!(tin.vertices().len(), 90);
    tin.assert_delaunay();
  }

  #[test]
  fn removing_down_to_a_triangle_unbootstraps() {
    let mut tin = square_tin();
    assert!(tin.remove(&Vertex::with_id(0.0, 0.0, 0.0, 0)).unwrap());
    assert_eq!(tin.count_triangles().count, 1);
    assert!(tin.remove(&Vertex::with_id(1.0, 0.0, 0.0, 1)).unwrap());
    assert!(!tin.is_bootstrapped());
    assert_eq!(tin.vertices().len(), 2);
    // The survivors are still there; adding one more re-bootstraps.
    assert!(tin.add(v(0.3, 0.4)).unwrap());
    assert_eq!(tin.count_triangles().count, 1);
  }
}
