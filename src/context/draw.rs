//! Draw entry points for RenderingContext.

use super::{GcHandle, RenderingContext};
use crate::color::Rgba;
use crate::device::{DeviceContext, DrawOp, MeshTriangle, Stamp};
use crate::error::{RenderError, RenderResult};
use crate::hatch::hatch_path;
use crate::marker_cache::MarkerStampCache;
use crate::path::Path;
use crate::path_loader::{fill_and_stroke, load_path, load_polyline};
use crate::pattern_cache::PatternCache;
use crate::text::{FontProperties, TextMetrics, TextShaper, TextSpan};
use crate::transform::{Affine2D, TransformSource};
use std::sync::Arc;

/// How collection offsets are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetPosition {
    /// Offsets resolve through the offset transform to device space.
    Display,
    /// Offsets are interpreted in data space (legacy; forces the
    /// generic per-item fallback).
    Data,
}

/// A dash specification in points; `None` segments mean a solid line.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dashes {
    pub offset: f64,
    pub segments: Option<Vec<f64>>,
}

/// Batched path-collection draw arguments. Attribute slices shorter than
/// the item count are indexed cyclically; empty slices disable the
/// corresponding operation.
pub struct PathCollectionParams<'a> {
    pub master_transform: TransformSource,
    pub paths: &'a [Arc<Path>],
    pub transforms: &'a [TransformSource],
    pub offsets: &'a [[f64; 2]],
    pub offset_transform: TransformSource,
    pub face_colors: &'a [Rgba],
    pub edge_colors: &'a [Rgba],
    /// Line widths, in points.
    pub line_widths: &'a [f64],
    pub dashes: &'a [Dashes],
    pub offset_position: OffsetPosition,
}

/// Quad-mesh draw arguments: a (height+1) x (width+1) row-major grid of
/// coordinates with one face color per quad.
pub struct QuadMeshParams<'a> {
    pub master_transform: TransformSource,
    pub mesh_width: usize,
    pub mesh_height: usize,
    pub coordinates: &'a [[f64; 2]],
    pub offsets: &'a [[f64; 2]],
    pub face_colors: &'a [Rgba],
    pub edge_colors: &'a [Rgba],
}

impl RenderingContext {
    /// Draw a path, optionally filled, stroked with the current source.
    pub fn draw_path(
        &mut self,
        gc: &GcHandle,
        path: &Path,
        transform: &TransformSource,
        fill: Option<Rgba>,
    ) -> RenderResult<()> {
        self.check_gc(gc)?;
        log::debug!(target: "figrender", "draw_path: {} vertices", path.len());
        self.with_draw_scope(|ctx| {
            let matrix = Affine2D::for_device(transform, ctx.height as f64)?;
            ctx.paint_path(path, &matrix, fill, true)
        })
    }

    /// Draw a marker at every vertex of `path`.
    pub fn draw_markers(
        &mut self,
        gc: &GcHandle,
        marker_path: &Path,
        marker_transform: &TransformSource,
        path: &Path,
        transform: &TransformSource,
        fill: Option<Rgba>,
    ) -> RenderResult<()> {
        self.check_gc(gc)?;
        log::debug!(target: "figrender", "draw_markers: {} positions", path.len());
        self.with_draw_scope(|ctx| {
            // Markers land at already-quantized integer positions;
            // per-vertex snapping would shift them within their stamps.
            let old_snap = ctx.states.top().snap;
            ctx.states.top_mut().snap = false;
            let result = ctx.draw_markers_inner(marker_path, marker_transform, path, transform, fill);
            ctx.states.top_mut().snap = old_snap;
            result
        })
    }

    fn draw_markers_inner(
        &mut self,
        marker_path: &Path,
        marker_transform: &TransformSource,
        path: &Path,
        transform: &TransformSource,
        fill: Option<Rgba>,
    ) -> RenderResult<()> {
        let marker_matrix = Affine2D::for_device(marker_transform, 0.0)?;
        let matrix = Affine2D::for_device(transform, self.height as f64)?;
        let alpha = self.states.top().alpha;
        let fill = fill.map(|c| c.with_alpha_override(alpha));
        let edge = self.device.source_rgba();
        // Marker positions use the vertices only; codes are ignored.
        let vertices = path.vertices();

        let threshold = if self.device.is_vector() {
            0.0
        } else {
            self.config.simplify_threshold
        };
        let cache = MarkerStampCache::build(
            self.device.as_mut(),
            threshold,
            vertices.len(),
            marker_path,
            &marker_matrix,
            fill,
            edge,
        )?;

        match cache {
            Some(cache) => {
                for vertex in vertices {
                    let (x, y) = matrix.transform_point(vertex[0], vertex[1]);
                    if !(x.is_finite() && y.is_finite()) {
                        continue;
                    }
                    cache.stamp(self.device.as_mut(), x, y);
                }
            }
            None => {
                for vertex in vertices {
                    let (x, y) = matrix.transform_point(vertex[0], vertex[1]);
                    if !(x.is_finite() && y.is_finite()) {
                        continue;
                    }
                    fill_and_stroke(
                        self.device.as_mut(),
                        marker_path,
                        &marker_matrix.offset(x, y),
                        fill,
                        Some(edge),
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Draw many (path, transform, offset, color, style) tuples, cached
    /// through the collection stamp cache where sound.
    pub fn draw_path_collection(
        &mut self,
        gc: &GcHandle,
        params: &PathCollectionParams<'_>,
    ) -> RenderResult<()> {
        self.check_gc(gc)?;
        log::debug!(
            target: "figrender",
            "draw_path_collection: {} paths, {} offsets",
            params.paths.len(),
            params.offsets.len()
        );
        // A stamped source pattern would misalign under per-instance
        // offsets while hatching; data-space offsets predate this fast
        // path. Both take the generic per-item route.
        if self.states.top().hatch.is_some() || params.offset_position == OffsetPosition::Data {
            return self.draw_path_collection_fallback(params);
        }
        self.with_draw_scope(|ctx| {
            let old_snap = ctx.states.top().snap;
            ctx.states.top_mut().snap = false;
            let result = ctx.draw_path_collection_stamped(params);
            ctx.states.top_mut().snap = old_snap;
            result
        })
    }

    fn draw_path_collection_stamped(
        &mut self,
        params: &PathCollectionParams<'_>,
    ) -> RenderResult<()> {
        let n_paths = params.paths.len();
        let n_offsets = params.offsets.len();
        if n_paths == 0 || n_offsets == 0 {
            return Ok(());
        }
        let n = n_paths.max(params.transforms.len()).max(n_offsets);
        let master = Affine2D::for_device(&params.master_transform, self.height as f64)?;
        let matrices = self.collection_matrices(params.transforms, &master)?;
        // The canvas-height offset is already carried by the master
        // matrix; the offset transform only folds the flip.
        let offset_matrix = Affine2D::for_device(&params.offset_transform, 0.0)?;

        let alpha = self.states.top().alpha;
        let face_colors: Vec<Rgba> = params
            .face_colors
            .iter()
            .map(|c| c.with_alpha_override(alpha))
            .collect();
        let edge_colors: Vec<Rgba> = params
            .edge_colors
            .iter()
            .map(|c| c.with_alpha_override(alpha))
            .collect();
        let line_widths: Vec<f64> = params
            .line_widths
            .iter()
            .map(|w| self.points_to_pixels(*w))
            .collect();
        let dashes: Vec<Option<(Vec<f64>, f64)>> = params
            .dashes
            .iter()
            .map(|d| {
                d.segments.as_ref().map(|segments| {
                    (
                        segments.iter().map(|s| self.points_to_pixels(*s)).collect(),
                        self.points_to_pixels(d.offset),
                    )
                })
            })
            .collect();

        // Full precision on vector-capable devices: no caching benefit.
        let threshold = if self.device.is_vector() {
            0.0
        } else {
            self.config.simplify_threshold
        };
        let mut cache = PatternCache::new(threshold);

        for i in 0..n {
            let path = &params.paths[i % n_paths];
            let matrix = &matrices[i % matrices.len()];
            let [ox, oy] = params.offsets[i % n_offsets];
            let (x, y) = offset_matrix.transform_point(ox, oy);
            if !(x.is_finite() && y.is_finite()) {
                continue;
            }
            if !face_colors.is_empty() {
                self.device
                    .set_source_rgba(face_colors[i % face_colors.len()]);
                cache.mask(
                    self.device.as_mut(),
                    path,
                    matrix,
                    DrawOp::Fill,
                    0.0,
                    &None,
                    x,
                    y,
                )?;
            }
            if !edge_colors.is_empty() {
                self.device
                    .set_source_rgba(edge_colors[i % edge_colors.len()]);
                let line_width = if line_widths.is_empty() {
                    self.device.line_width()
                } else {
                    line_widths[i % line_widths.len()]
                };
                let dash = if dashes.is_empty() {
                    None
                } else {
                    dashes[i % dashes.len()].clone()
                };
                cache.mask(
                    self.device.as_mut(),
                    path,
                    matrix,
                    DrawOp::Stroke,
                    line_width,
                    &dash,
                    x,
                    y,
                )?;
            }
            // Per-item antialias hints are dropped in this fast path, as
            // are urls, which belong to a post-processing step.
        }
        Ok(())
    }

    // Generic per-item drawing, used when stamping is unsound.
    fn draw_path_collection_fallback(
        &mut self,
        params: &PathCollectionParams<'_>,
    ) -> RenderResult<()> {
        self.with_draw_scope(|ctx| {
            let n_paths = params.paths.len();
            let n_offsets = params.offsets.len();
            if n_paths == 0 || n_offsets == 0 {
                return Ok(());
            }
            let n = n_paths.max(params.transforms.len()).max(n_offsets);
            let master = Affine2D::for_device(&params.master_transform, ctx.height as f64)?;
            let matrices = ctx.collection_matrices(params.transforms, &master)?;
            let offset_matrix = match params.offset_position {
                OffsetPosition::Display => {
                    Affine2D::for_device(&params.offset_transform, 0.0)?
                }
                // Data-space offsets resolve through the offset transform
                // and then through the master transform.
                OffsetPosition::Data => Affine2D::compose(&params.offset_transform, &master)?,
            };
            let alpha = ctx.states.top().alpha;

            for i in 0..n {
                let path = &params.paths[i % n_paths];
                let matrix = &matrices[i % matrices.len()];
                let [ox, oy] = params.offsets[i % n_offsets];
                let (x, y) = offset_matrix.transform_point(ox, oy);
                if !(x.is_finite() && y.is_finite()) {
                    continue;
                }
                ctx.device.save();
                let result = (|| {
                    if !params.line_widths.is_empty() {
                        let width = ctx
                            .points_to_pixels(params.line_widths[i % params.line_widths.len()]);
                        ctx.device.set_line_width(width);
                    }
                    if !params.dashes.is_empty() {
                        let dash = &params.dashes[i % params.dashes.len()];
                        match &dash.segments {
                            Some(segments) => {
                                let segments: Vec<f64> =
                                    segments.iter().map(|s| ctx.points_to_pixels(*s)).collect();
                                let offset = ctx.points_to_pixels(dash.offset);
                                ctx.device.set_dash(&segments, offset);
                            }
                            None => ctx.device.set_dash(&[], 0.0),
                        }
                    }
                    if !params.edge_colors.is_empty() {
                        let edge = params.edge_colors[i % params.edge_colors.len()]
                            .with_alpha_override(alpha);
                        ctx.device.set_source_rgba(edge);
                    }
                    let fill = if params.face_colors.is_empty() {
                        None
                    } else {
                        Some(
                            params.face_colors[i % params.face_colors.len()]
                                .with_alpha_override(alpha),
                        )
                    };
                    ctx.paint_path(path, &matrix.offset(x, y), fill, false)
                })();
                ctx.device.restore();
                result?;
            }
            Ok(())
        })
    }

    fn collection_matrices(
        &self,
        transforms: &[TransformSource],
        master: &Affine2D,
    ) -> RenderResult<Vec<Affine2D>> {
        if transforms.is_empty() {
            Ok(vec![*master])
        } else {
            transforms
                .iter()
                .map(|t| Affine2D::compose(t, master))
                .collect()
        }
    }

    /// Draw a quad mesh. With edge colors the quads are drawn one at a
    /// time so the edges exist; without them, flat-colored mesh patches
    /// avoid conflation artifacts at the junctions.
    pub fn draw_quad_mesh(&mut self, gc: &GcHandle, params: &QuadMeshParams<'_>) -> RenderResult<()> {
        self.check_gc(gc)?;
        let mesh_width = params.mesh_width;
        let mesh_height = params.mesh_height;
        if params.coordinates.len() != (mesh_width + 1) * (mesh_height + 1)
            || params.face_colors.len() != mesh_width * mesh_height
        {
            return Err(RenderError::InvalidArgument(
                "non-matching shapes".to_string(),
            ));
        }
        if params.offsets.len() != 1 || params.offsets[0] != [0.0, 0.0] {
            return Err(RenderError::InvalidArgument(
                "non-trivial offsets not supported".to_string(),
            ));
        }
        log::debug!(target: "figrender", "draw_quad_mesh: {}x{}", mesh_width, mesh_height);
        self.with_draw_scope(|ctx| {
            let matrix = Affine2D::for_device(&params.master_transform, ctx.height as f64)?;
            let coords: Vec<(f64, f64)> = params
                .coordinates
                .iter()
                .map(|[x, y]| matrix.transform_point(*x, *y))
                .collect();
            let stride = mesh_width + 1;

            if !params.edge_colors.is_empty() {
                for i in 0..mesh_height {
                    for j in 0..mesh_width {
                        let c00 = coords[i * stride + j];
                        let c01 = coords[i * stride + j + 1];
                        let c11 = coords[(i + 1) * stride + j + 1];
                        let c10 = coords[(i + 1) * stride + j];
                        ctx.device.new_path();
                        ctx.device.move_to(c00.0, c00.1);
                        ctx.device.line_to(c01.0, c01.1);
                        ctx.device.line_to(c11.0, c11.1);
                        ctx.device.line_to(c10.0, c10.1);
                        ctx.device.close_path();
                        let quad = i * mesh_width + j;
                        ctx.device.set_source_rgba(params.face_colors[quad]);
                        ctx.device.fill_current_path(true);
                        ctx.device
                            .set_source_rgba(params.edge_colors[quad % params.edge_colors.len()]);
                        ctx.device.stroke_current_path(false);
                    }
                }
            } else {
                let mut patches = Vec::with_capacity(mesh_width * mesh_height * 2);
                for i in 0..mesh_height {
                    for j in 0..mesh_width {
                        let color = params.face_colors[i * mesh_width + j];
                        let c00 = coords[i * stride + j];
                        let c01 = coords[i * stride + j + 1];
                        let c11 = coords[(i + 1) * stride + j + 1];
                        let c10 = coords[(i + 1) * stride + j];
                        patches.push(MeshTriangle {
                            points: [[c00.0, c00.1], [c01.0, c01.1], [c11.0, c11.1]],
                            colors: [color; 3],
                        });
                        patches.push(MeshTriangle {
                            points: [[c00.0, c00.1], [c11.0, c11.1], [c10.0, c10.1]],
                            colors: [color; 3],
                        });
                    }
                }
                ctx.device.draw_mesh_gradient(&patches);
            }
            Ok(())
        })
    }

    /// Draw Gouraud-shaded triangles (mesh gradient).
    pub fn draw_gouraud_triangles(
        &mut self,
        gc: &GcHandle,
        triangles: &[[[f64; 2]; 3]],
        colors: &[[Rgba; 3]],
        transform: &TransformSource,
    ) -> RenderResult<()> {
        self.check_gc(gc)?;
        if triangles.len() != colors.len() {
            return Err(RenderError::InvalidArgument(
                "non-matching shapes".to_string(),
            ));
        }
        log::debug!(target: "figrender", "draw_gouraud_triangles: {}", triangles.len());
        self.with_draw_scope(|ctx| {
            let matrix = Affine2D::for_device(transform, ctx.height as f64)?;
            let patches: Vec<MeshTriangle> = triangles
                .iter()
                .zip(colors)
                .map(|(points, colors)| {
                    let mut mapped = [[0.0; 2]; 3];
                    for (dst, src) in mapped.iter_mut().zip(points) {
                        let (x, y) = matrix.transform_point(src[0], src[1]);
                        *dst = [x, y];
                    }
                    MeshTriangle {
                        points: mapped,
                        colors: *colors,
                    }
                })
                .collect();
            ctx.device.draw_mesh_gradient(&patches);
            Ok(())
        })
    }

    /// Composite a straight-alpha RGBA image with its lower-left corner
    /// at (x, y) in path space.
    pub fn draw_image(
        &mut self,
        gc: &GcHandle,
        x: f64,
        y: f64,
        rgba: &[u8],
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        self.check_gc(gc)?;
        if rgba.len() != width as usize * height as usize * 4 {
            return Err(RenderError::InvalidArgument(
                "RGBA buffer does not match its dimensions".to_string(),
            ));
        }
        log::debug!(target: "figrender", "draw_image: {}x{} at {} {}", width, height, x, y);
        self.with_draw_scope(|ctx| {
            // The alpha override was already applied upstream by the image
            // pipeline; only premultiply here.
            let mut premultiplied = Vec::with_capacity(rgba.len());
            for px in rgba.chunks_exact(4) {
                let a = px[3] as u16;
                premultiplied.push(((px[0] as u16 * a + 127) / 255) as u8);
                premultiplied.push(((px[1] as u16 * a + 127) / 255) as u8);
                premultiplied.push(((px[2] as u16 * a + 127) / 255) as u8);
                premultiplied.push(px[3]);
            }
            let device_y = ctx.height as f64 - y - height as f64;
            ctx.device
                .composite_image(&premultiplied, width, height, x, device_y);
            Ok(())
        })
    }

    /// Draw a text span through the shaping collaborator. The context's
    /// resolution is passed explicitly; the shaper has no other way to
    /// discover it.
    pub fn draw_text(
        &mut self,
        gc: &GcHandle,
        shaper: &mut dyn TextShaper,
        span: &TextSpan<'_>,
    ) -> RenderResult<()> {
        self.check_gc(gc)?;
        log::debug!(target: "figrender", "draw_text: {:?} at {} {}", span.text, span.x, span.y);
        let dpi = self.dpi();
        self.with_draw_scope(|ctx| shaper.draw(ctx.device.as_mut(), span, dpi))
    }

    /// Measure a string through the shaping collaborator at this
    /// context's resolution.
    pub fn text_metrics(
        &mut self,
        shaper: &mut dyn TextShaper,
        text: &str,
        font: &FontProperties,
    ) -> RenderResult<TextMetrics> {
        shaper.measure(text, font, self.dpi())
    }

    // --- Shared path painting ---

    fn paint_path(
        &mut self,
        path: &Path,
        matrix: &Affine2D,
        fill: Option<Rgba>,
        allow_chunking: bool,
    ) -> RenderResult<()> {
        let (alpha, snap, sketch, hatch, hatch_color, hatch_linewidth) = {
            let state = self.states.top();
            (
                state.alpha,
                state.snap,
                state.sketch,
                state.hatch.clone(),
                state.hatch_color,
                state.hatch_linewidth,
            )
        };
        let mut path_loaded = false;

        if let Some(color) = fill {
            load_path(self.device.as_mut(), path, matrix, snap, sketch.as_ref())?;
            path_loaded = true;
            self.device.save();
            self.device
                .set_source_rgba(color.with_alpha_override(alpha));
            self.device.fill_current_path(true);
            self.device.restore();
        }

        if let Some(name) = &hatch {
            if let Some(tile) = self.render_hatch_tile(name, hatch_color, hatch_linewidth)? {
                if !path_loaded {
                    load_path(self.device.as_mut(), path, matrix, snap, sketch.as_ref())?;
                    path_loaded = true;
                }
                self.device.save();
                self.device.clip_current_path(true);
                self.device.paint_tiled(&tile);
                self.device.restore();
            }
        }

        let chunk = self.config.chunk_size;
        let chunked = allow_chunking && !path_loaded && chunk > 0 && path.codes().is_none();
        if chunked {
            // Fixed-size windows with a one-vertex overlap bound the
            // device path buffer while keeping segments connected.
            let vertices = path.vertices();
            let n = vertices.len();
            let mut start = 0;
            while start < n {
                let stop = (start + chunk + 1).min(n);
                load_polyline(
                    self.device.as_mut(),
                    vertices,
                    start,
                    stop,
                    matrix,
                    snap,
                    sketch.as_ref(),
                )?;
                self.device.stroke_current_path(false);
                start += chunk;
            }
        } else {
            if !path_loaded {
                load_path(self.device.as_mut(), path, matrix, snap, sketch.as_ref())?;
            }
            self.device.stroke_current_path(false);
        }
        Ok(())
    }

    // Render one dpi-sized tile of the named hatch pattern on a scratch
    // surface. Hatch tiles never snap.
    fn render_hatch_tile(
        &mut self,
        name: &str,
        color: Rgba,
        linewidth_points: f64,
    ) -> RenderResult<Option<Stamp>> {
        let pattern = hatch_path(name)?;
        // Truncating the resolution is good enough for the tile size.
        let size = (self.dpi() as u32).max(1);
        let Some(mut scratch) = self.device.new_stamp_surface(size, size) else {
            return Ok(None);
        };
        scratch.set_line_width(self.points_to_pixels(linewidth_points));
        let tile = size as f64;
        let matrix = Affine2D {
            xx: tile,
            yx: 0.0,
            xy: 0.0,
            yy: -tile,
            x0: 0.0,
            y0: tile,
        };
        fill_and_stroke(&mut scratch, &pattern, &matrix, Some(color), Some(color))?;
        Ok(Some(scratch.snapshot()))
    }
}
