mod clip;

use crate::algorithms::triangulation::IncrementalTin;
use crate::data::{Bounds, EdgeId, Vertex, VertexId};
use crate::Error;
use clip::clip_segment;
use log::debug;
use ordered_float::OrderedFloat;

type Result<T> = std::result::Result<T, Error>;

/// Build options for a bounded Voronoi diagram.
#[derive(Debug, Clone)]
pub struct BoundedVoronoiOptions {
  /// Explicit frame; must contain the sample bounds. When absent the
  /// samples are padded by a quarter of the mean edge length per side.
  pub bounds: Option<Bounds>,
  /// Snap circumcenters lying within `adjustment_threshold` outside the
  /// frame onto it.
  pub enable_adjustments: bool,
  pub adjustment_threshold: f64,
  /// Assign color indices so that adjacent polygons differ.
  pub enable_automatic_color_assignment: bool,
}

impl Default for BoundedVoronoiOptions {
  fn default() -> BoundedVoronoiOptions {
    BoundedVoronoiOptions {
      bounds: None,
      enable_adjustments: false,
      adjustment_threshold: 1.0e-9,
      enable_automatic_color_assignment: false,
    }
  }
}

/// A Voronoi (Thiessen) cell, clipped to the frame.
#[derive(Debug, Clone)]
pub struct ThiessenPolygon {
  site: Vertex,
  edges: Vec<[usize; 2]>,
  open: bool,
  area: f64,
  color: u8,
}

impl ThiessenPolygon {
  pub fn site(&self) -> &Vertex {
    &self.site
  }

  /// Ordered loop of edges, as index pairs into the diagram's Voronoi
  /// vertex list.
  pub fn edges(&self) -> &[[usize; 2]] {
    &self.edges
  }

  /// True when the cell belongs to a convex-hull site and was closed only
  /// by clipping against the frame.
  pub fn is_open(&self) -> bool {
    self.open
  }

  pub fn area(&self) -> f64 {
    self.area
  }

  pub fn color_index(&self) -> u8 {
    self.color
  }
}

/// Bounded Voronoi diagram: the dual of a Delaunay triangulation, clipped
/// to a rectangular frame.
///
/// Owns its circumcenter vertices and the synthetic border and corner
/// vertices produced by clipping. Circumcenters carry z = NaN; synthetic
/// perimeter vertices carry the frame parameterization z in [0, 4).
pub struct BoundedVoronoi {
  bounds: Bounds,
  sample_bounds: Bounds,
  sites: Vec<Vertex>,
  vertices: Vec<Vertex>,
  edges: Vec<[usize; 2]>,
  polygons: Vec<ThiessenPolygon>,
}

// Per-pair Voronoi segment: the endpoint adjacent to the dual half's face
// and the endpoint adjacent to the base half's face, after clipping.
type PairSegment = Option<(usize, usize)>;

impl BoundedVoronoi {
  /// Builds the diagram over the vertices of an existing triangulation.
  pub fn from_tin(tin: &IncrementalTin, options: &BoundedVoronoiOptions) -> Result<BoundedVoronoi> {
    if !tin.is_bootstrapped() {
      return Err(Error::InsufficientVertices);
    }
    let mut sample_bounds = Bounds::empty();
    for v in tin.vertices() {
      sample_bounds.extend(v.x(), v.y());
    }
    let mut edge_total = 0.0;
    let mut edge_count = 0usize;
    for e in tin.pool.iter() {
      if let (Some(a), Some(b)) = (tin.pool.origin(e), tin.pool.dest(e)) {
        let (ax, ay) = tin.coords(a);
        let (bx, by) = tin.coords(b);
        edge_total += ((bx - ax) * (bx - ax) + (by - ay) * (by - ay)).sqrt();
        edge_count += 1;
      }
    }
    let mean_edge = if edge_count > 0 {
      edge_total / edge_count as f64
    } else {
      1.0
    };
    let bounds = match options.bounds {
      Some(b) => {
        if !b.contains_bounds(&sample_bounds) {
          return Err(Error::BoundsViolation);
        }
        b
      }
      None => sample_bounds.padded(0.25 * mean_edge),
    };
    let mut builder = Builder {
      tin,
      options,
      bounds,
      vertices: Vec::new(),
      edges: Vec::new(),
      polygons: Vec::new(),
      centers: vec![None; 2 * tin.pool.capacity()],
      segments: vec![None; tin.pool.capacity()],
      corners: [0; 4],
      polygon_slots: Vec::new(),
    };
    builder.build()?;
    Ok(BoundedVoronoi {
      bounds,
      sample_bounds,
      sites: tin.vertices(),
      vertices: builder.vertices,
      edges: builder.edges,
      polygons: builder.polygons,
    })
  }

  /// Builds a triangulation over the given vertices, then the diagram.
  pub fn from_vertices(
    vertices: Vec<Vertex>,
    options: &BoundedVoronoiOptions,
  ) -> Result<BoundedVoronoi> {
    if vertices.len() < 3 {
      return Err(Error::InsufficientVertices);
    }
    let mut sample_bounds = Bounds::empty();
    for v in vertices.iter() {
      sample_bounds.extend(v.x(), v.y());
    }
    let spacing = (sample_bounds.area() / vertices.len() as f64).sqrt();
    let mut tin = IncrementalTin::new(if spacing > 0.0 { spacing } else { 1.0 });
    if !tin.add_all(vertices, None)? {
      return Err(Error::CoLinearViolation);
    }
    BoundedVoronoi::from_tin(&tin, options)
  }

  pub fn bounds(&self) -> &Bounds {
    &self.bounds
  }

  pub fn sample_bounds(&self) -> &Bounds {
    &self.sample_bounds
  }

  /// The input sites.
  pub fn vertices(&self) -> &[Vertex] {
    &self.sites
  }

  /// The diagram's own vertices: circumcenters plus synthetic border and
  /// corner points.
  pub fn voronoi_vertices(&self) -> &[Vertex] {
    &self.vertices
  }

  pub fn edges(&self) -> &[[usize; 2]] {
    &self.edges
  }

  pub fn polygons(&self) -> &[ThiessenPolygon] {
    &self.polygons
  }

  /// The polygon containing (x, y), by the Voronoi definition: the cell of
  /// the nearest site. None outside the frame.
  pub fn containing_polygon(&self, x: f64, y: f64) -> Option<&ThiessenPolygon> {
    if !self.bounds.contains(x, y) {
      return None;
    }
    self
      .polygons
      .iter()
      .min_by_key(|p| OrderedFloat(p.site().distance_sq(x, y)))
  }
}

struct Builder<'a> {
  tin: &'a IncrementalTin,
  options: &'a BoundedVoronoiOptions,
  bounds: Bounds,
  vertices: Vec<Vertex>,
  edges: Vec<[usize; 2]>,
  polygons: Vec<ThiessenPolygon>,
  centers: Vec<Option<usize>>,
  segments: Vec<PairSegment>,
  corners: [usize; 4],
  polygon_slots: Vec<usize>,
}

impl<'a> Builder<'a> {
  fn build(&mut self) -> Result<()> {
    for i in 0..4 {
      let (x, y) = self.bounds.corner(i);
      self.corners[i] = self.push_vertex(x, y, i as f64);
    }
    self.compute_circumcenters();
    self.compute_segments();
    self.assemble_polygons()?;
    if self.options.enable_automatic_color_assignment {
      self.assign_colors();
    }
    debug!(
      "bounded voronoi: {} polygons, {} vertices, {} edges",
      self.polygons.len(),
      self.vertices.len(),
      self.edges.len()
    );
    Ok(())
  }

  fn push_vertex(&mut self, x: f64, y: f64, z: f64) -> usize {
    let mut v = Vertex::with_id(x, y, z, self.vertices.len());
    v.set_synthetic(true);
    self.vertices.push(v);
    self.vertices.len() - 1
  }

  /// One circumcenter per non-ghost face, indexed by each of the face's
  /// three half-edges.
  fn compute_circumcenters(&mut self) {
    let tin = self.tin;
    for base in tin.pool.iter() {
      for &e in [base, base.dual()].iter() {
        let f = tin.pool.forward(e);
        let g = tin.pool.forward(f);
        if e.index() > f.index() || e.index() > g.index() {
          continue;
        }
        let (a, b, c) = match (tin.pool.origin(e), tin.pool.origin(f), tin.pool.origin(g)) {
          (Some(a), Some(b), Some(c)) => (a, b, c),
          _ => continue,
        };
        let (ax, ay) = tin.coords(a);
        let (bx, by) = tin.coords(b);
        let (cx, cy) = tin.coords(c);
        let (mut ux, mut uy) = match tin.predicates.circumcenter(ax, ay, bx, by, cx, cy) {
          Some(center) => center,
          // Degenerate face: fall back to the centroid so the diagram
          // stays total.
          None => ((ax + bx + cx) / 3.0, (ay + by + cy) / 3.0),
        };
        if self.options.enable_adjustments && !self.bounds.contains(ux, uy) {
          let t = self.options.adjustment_threshold;
          let clamped_x = ux.max(self.bounds.x_min()).min(self.bounds.x_max());
          let clamped_y = uy.max(self.bounds.y_min()).min(self.bounds.y_max());
          if (clamped_x - ux).abs() <= t && (clamped_y - uy).abs() <= t {
            ux = clamped_x;
            uy = clamped_y;
          }
        }
        let z = if self.on_frame(ux, uy) {
          self.bounds.boundary_parameter(ux, uy)
        } else {
          f64::NAN
        };
        let at = self.push_vertex(ux, uy, z);
        self.centers[e.index()] = Some(at);
        self.centers[f.index()] = Some(at);
        self.centers[g.index()] = Some(at);
      }
    }
  }

  fn on_frame(&self, x: f64, y: f64) -> bool {
    self.bounds.contains(x, y)
      && (x == self.bounds.x_min()
        || x == self.bounds.x_max()
        || y == self.bounds.y_min()
        || y == self.bounds.y_max())
  }

  /// Clips one Voronoi edge per triangulation pair: the segment between
  /// adjacent circumcenters for interior pairs, the outward perimeter ray
  /// for hull pairs.
  fn compute_segments(&mut self) {
    let tin = self.tin;
    for base in tin.pool.iter() {
      if tin.pool.origin(base).is_none() || tin.pool.dest(base).is_none() {
        continue;
      }
      let base_center = self.centers[base.index()];
      let dual_center = self.centers[base.index() ^ 1];
      let segment = match (dual_center, base_center) {
        (Some(u), Some(w)) => self.clip_interior(u, w),
        (None, Some(w)) => self.clip_ray(base, w),
        (Some(u), None) => self.clip_ray(base.dual(), u).map(|(border, near)| (near, border)),
        (None, None) => None,
      };
      self.segments[base.pair()] = segment;
      if let Some((u, w)) = segment {
        self.edges.push([u, w]);
      }
    }
  }

  /// Interior Voronoi edge between circumcenters u (dual side) and w
  /// (base side), clipped to the frame; clipped ends become synthetic
  /// perimeter vertices stamped with the boundary parameter.
  fn clip_interior(&mut self, u: usize, w: usize) -> PairSegment {
    let p0 = self.vertices[u];
    let p1 = self.vertices[w];
    let c = clip_segment(
      p0.x(),
      p0.y(),
      p1.x(),
      p1.y(),
      self.bounds.x_min(),
      self.bounds.x_max(),
      self.bounds.y_min(),
      self.bounds.y_max(),
    )?;
    let dx = p1.x() - p0.x();
    let dy = p1.y() - p0.y();
    let start = if c.enters_clipped() {
      let x = p0.x() + c.t_enter * dx;
      let y = p0.y() + c.t_enter * dy;
      let z = self.bounds.boundary_parameter(x, y);
      self.push_vertex(x, y, z)
    } else {
      u
    };
    let end = if c.exits_clipped() {
      let x = p0.x() + c.t_exit * dx;
      let y = p0.y() + c.t_exit * dy;
      let z = self.bounds.boundary_parameter(x, y);
      self.push_vertex(x, y, z)
    } else {
      w
    };
    Some((start, end))
  }

  /// Perimeter ray for a hull pair: from the interior face's circumcenter,
  /// perpendicular to the hull edge, outward. Returns the synthetic vertex
  /// where the ray leaves the frame paired with the near endpoint (the
  /// center itself, or its clipped entry when the center lies outside the
  /// frame). `interior` is the half whose left face is real.
  fn clip_ray(&mut self, interior: EdgeId, center: usize) -> Option<(usize, usize)> {
    let tin = self.tin;
    let a = tin.pool.origin(interior)?;
    let b = tin.pool.dest(interior)?;
    let (ax, ay) = tin.coords(a);
    let (bx, by) = tin.coords(b);
    let ex = bx - ax;
    let ey = by - ay;
    let len = (ex * ex + ey * ey).sqrt();
    if len == 0.0 {
      return None;
    }
    // Interior lies to the left of a->b; the outward normal points right.
    let nx = ey / len;
    let ny = -ex / len;
    let c = self.vertices[center];
    let diag = (self.bounds.width() * self.bounds.width()
      + self.bounds.height() * self.bounds.height())
    .sqrt();
    let reach = 2.0 * diag
      + ((c.x() - self.bounds.x_min()).abs() + (c.y() - self.bounds.y_min()).abs());
    let fx = c.x() + nx * reach;
    let fy = c.y() + ny * reach;
    let clipped = clip_segment(
      c.x(),
      c.y(),
      fx,
      fy,
      self.bounds.x_min(),
      self.bounds.x_max(),
      self.bounds.y_min(),
      self.bounds.y_max(),
    )?;
    let x = c.x() + clipped.t_exit * (fx - c.x());
    let y = c.y() + clipped.t_exit * (fy - c.y());
    let z = self.bounds.boundary_parameter(x, y);
    let border = self.push_vertex(x, y, z);
    let near = if clipped.enters_clipped() {
      let x = c.x() + clipped.t_enter * (fx - c.x());
      let y = c.y() + clipped.t_enter * (fy - c.y());
      let z = self.bounds.boundary_parameter(x, y);
      self.push_vertex(x, y, z)
    } else {
      center
    };
    Some((border, near))
  }

  fn assemble_polygons(&mut self) -> Result<()> {
    let tin = self.tin;
    // One outgoing spoke per occupant.
    let mut spoke_of: Vec<Option<EdgeId>> = vec![None; tin.verts.len()];
    for base in tin.pool.iter() {
      for &e in [base, base.dual()].iter() {
        if let Some(v) = tin.pool.origin(e) {
          if spoke_of[v.0].is_none() {
            spoke_of[v.0] = Some(e);
          }
        }
      }
    }
    for slot in 0..tin.verts.len() {
      let start = match spoke_of[slot] {
        Some(e) => e,
        None => continue,
      };
      let site = match tin.verts[slot].as_ref() {
        Some(occupant) => occupant.as_vertex(),
        None => continue,
      };
      self.assemble_polygon(VertexId(slot), site, start)?;
    }
    Ok(())
  }

  fn assemble_polygon(&mut self, vid: VertexId, site: Vertex, start: EdgeId) -> Result<()> {
    let tin = self.tin;
    // Counter-clockwise pinwheel around the site.
    let mut spokes = Vec::new();
    let mut e = start;
    loop {
      spokes.push(e);
      e = tin.pool.reverse(e).dual();
      if e == start {
        break;
      }
      if spokes.len() > tin.pool.len() * 2 {
        return Err(Error::InvariantViolation);
      }
    }
    // A hull site has one ghost spoke; start just past it so the gap falls
    // between the last and first Voronoi edges.
    let ghost_at = spokes.iter().position(|&s| tin.pool.dest(s).is_none());
    let open = ghost_at.is_some();
    if let Some(at) = ghost_at {
      spokes.rotate_left(at + 1);
      spokes.pop();
    }
    let mut segs: Vec<(usize, usize)> = Vec::with_capacity(spokes.len());
    for &s in spokes.iter() {
      if let Some((u, w)) = self.segments[s.pair()] {
        // The stored pair runs dual-side to base-side; a dual spoke sees
        // it reversed.
        if s.is_base() {
          segs.push((u, w));
        } else {
          segs.push((w, u));
        }
      }
    }
    if segs.is_empty() {
      return Ok(());
    }
    let mut edges: Vec<[usize; 2]> = Vec::with_capacity(segs.len() + 4);
    let n = segs.len();
    for i in 0..n {
      let (a, b) = segs[i];
      edges.push([a, b]);
      let (next_start, _) = segs[(i + 1) % n];
      if b != next_start {
        self.thread_boundary(b, next_start, &mut edges);
      }
    }
    let mut area = 0.0;
    for &[a, b] in edges.iter() {
      let pa = &self.vertices[a];
      let pb = &self.vertices[b];
      area += pa.x() * pb.y() - pb.x() * pa.y();
    }
    area *= 0.5;
    self.polygon_slots.push(vid.0);
    self.polygons.push(ThiessenPolygon {
      site,
      edges,
      open,
      area,
      color: 0,
    });
    Ok(())
  }

  /// Connects two perimeter vertices along the frame, inserting one
  /// synthetic edge per traversed border and threading corners in the
  /// order bottom, right, top, left.
  fn thread_boundary(&mut self, from: usize, to: usize, edges: &mut Vec<[usize; 2]>) {
    let z0 = self.vertices[from].z();
    let mut z1 = self.vertices[to].z();
    if z0.is_nan() || z1.is_nan() || (z1 - z0).abs() < 1.0e-12 {
      // Clipping discontinuity or coincident exits; close the loop
      // directly.
      edges.push([from, to]);
      self.edges.push([from, to]);
      return;
    }
    if z1 <= z0 {
      z1 += 4.0;
    }
    let mut current = from;
    let mut corner = z0.floor() as i64 + 1;
    while (corner as f64) < z1 {
      let at = self.corners[(corner as usize) & 3];
      edges.push([current, at]);
      self.edges.push([current, at]);
      current = at;
      corner += 1;
    }
    edges.push([current, to]);
    self.edges.push([current, to]);
  }

  fn assign_colors(&mut self) {
    let tin = self.tin;
    // Polygon position by site slot.
    let mut by_slot: Vec<Option<usize>> = vec![None; tin.verts.len()];
    for (at, &slot) in self.polygon_slots.iter().enumerate() {
      by_slot[slot] = Some(at);
    }
    let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); self.polygons.len()];
    for e in tin.pool.iter() {
      if let (Some(a), Some(b)) = (tin.pool.origin(e), tin.pool.dest(e)) {
        if let (Some(pa), Some(pb)) = (by_slot[a.0], by_slot[b.0]) {
          neighbors[pa].push(pb);
          neighbors[pb].push(pa);
        }
      }
    }
    for at in 0..self.polygons.len() {
      let mut used = [false; 16];
      for &n in neighbors[at].iter() {
        if n < at {
          used[self.polygons[n].color as usize & 15] = true;
        }
      }
      let color = (0..16).find(|&c| !used[c]).unwrap_or(0) as u8;
      self.polygons[at].color = color;
      self.polygons[at].site.set_color_index(color);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sites3() -> Vec<Vertex> {
    vec![
      Vertex::with_id(0.0, 0.0, 0.0, 0),
      Vertex::with_id(2.0, 0.0, 0.0, 1),
      Vertex::with_id(1.0, 2.0, 0.0, 2),
    ]
  }

  #[test]
  fn three_sites_three_open_polygons() {
    let v = BoundedVoronoi::from_vertices(sites3(), &BoundedVoronoiOptions::default()).unwrap();
    assert_eq!(v.polygons().len(), 3);
    for p in v.polygons() {
      assert!(p.is_open());
      let hit = v.containing_polygon(p.site().x(), p.site().y()).unwrap();
      assert_eq!(hit.site().id(), p.site().id());
    }
    let total: f64 = v.polygons().iter().map(ThiessenPolygon::area).sum();
    assert!(
      (total - v.bounds().area()).abs() < 1.0e-9 * v.bounds().area(),
      "polygon areas {} should cover the frame {}",
      total,
      v.bounds().area()
    );
  }

  #[test]
  fn interior_site_polygon_is_closed() {
    let mut sites = vec![
      Vertex::with_id(0.0, 0.0, 0.0, 0),
      Vertex::with_id(4.0, 0.0, 0.0, 1),
      Vertex::with_id(4.0, 4.0, 0.0, 2),
      Vertex::with_id(0.0, 4.0, 0.0, 3),
    ];
    sites.push(Vertex::with_id(2.0, 2.0, 0.0, 4));
    let v = BoundedVoronoi::from_vertices(sites, &BoundedVoronoiOptions::default()).unwrap();
    assert_eq!(v.polygons().len(), 5);
    let center = v.containing_polygon(2.0, 2.0).unwrap();
    assert_eq!(center.site().id(), 4);
    assert!(!center.is_open());
    // The center cell of the 4x4 square with corner sites is the square of
    // the perpendicular bisectors, area 8.
    assert!((center.area() - 8.0).abs() < 1.0e-9);
    let open_count = v.polygons().iter().filter(|p| p.is_open()).count();
    assert_eq!(open_count, 4);
    let total: f64 = v.polygons().iter().map(ThiessenPolygon::area).sum();
    assert!((total - v.bounds().area()).abs() < 1.0e-9 * v.bounds().area());
  }

  #[test]
  fn explicit_bounds_must_contain_samples() {
    let mut options = BoundedVoronoiOptions::default();
    options.bounds = Some(Bounds::new(0.0, 1.0, 0.0, 1.0));
    assert_eq!(
      BoundedVoronoi::from_vertices(sites3(), &options).err(),
      Some(Error::BoundsViolation)
    );
    options.bounds = Some(Bounds::new(-5.0, 5.0, -5.0, 5.0));
    let v = BoundedVoronoi::from_vertices(sites3(), &options).unwrap();
    assert_eq!(v.bounds().area(), 100.0);
    let total: f64 = v.polygons().iter().map(ThiessenPolygon::area).sum();
    assert!((total - 100.0).abs() < 1.0e-7);
  }

  #[test]
  fn duality_on_a_grid() {
    let mut sites = Vec::new();
    let mut id = 0;
    for i in 0..5 {
      for j in 0..5 {
        sites.push(Vertex::with_id(i as f64, j as f64, 0.0, id));
        id += 1;
      }
    }
    let v = BoundedVoronoi::from_vertices(sites.clone(), &BoundedVoronoiOptions::default()).unwrap();
    assert_eq!(v.polygons().len(), 25);
    for s in sites.iter() {
      let p = v.containing_polygon(s.x(), s.y()).unwrap();
      assert_eq!(p.site().id(), s.id());
    }
    let open_count = v.polygons().iter().filter(|p| p.is_open()).count();
    assert_eq!(open_count, 16);
    let total: f64 = v.polygons().iter().map(ThiessenPolygon::area).sum();
    assert!((total - v.bounds().area()).abs() < 1.0e-7 * v.bounds().area());
  }

  #[test]
  fn colors_differ_across_adjacent_cells() {
    let mut options = BoundedVoronoiOptions::default();
    options.enable_automatic_color_assignment = true;
    let mut sites = Vec::new();
    let mut id = 0;
    for i in 0..4 {
      for j in 0..4 {
        sites.push(Vertex::with_id(i as f64 * 1.1, j as f64 * 0.9, 0.0, id));
        id += 1;
      }
    }
    let v = BoundedVoronoi::from_vertices(sites, &options).unwrap();
    // Neighboring cells share a Delaunay edge; spot-check a handful of
    // adjacent site pairs on the grid.
    let find = |x: f64, y: f64| v.containing_polygon(x, y).unwrap();
    let a = find(0.0, 0.0);
    let b = find(1.1, 0.0);
    let c = find(0.0, 0.9);
    assert_ne!(a.color_index(), b.color_index());
    assert_ne!(a.color_index(), c.color_index());
  }

  #[test]
  fn voronoi_vertices_carry_boundary_parameters() {
    let v = BoundedVoronoi::from_vertices(sites3(), &BoundedVoronoiOptions::default()).unwrap();
    let mut interior = 0;
    let mut on_border = 0;
    for p in v.voronoi_vertices() {
      if p.z().is_nan() {
        interior += 1;
      } else {
        assert!(p.z() >= 0.0 && p.z() < 4.0);
        on_border += 1;
      }
    }
    assert!(interior >= 1);
    // Four corners plus the clipped ray exits.
    assert!(on_border >= 7);
  }
}
