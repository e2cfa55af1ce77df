//! Named polygonal regions of interest and their pixel masks.

use geo::{BoundingRect, MapCoords};
use geo_types::{coord, Coord, LineString, Polygon, Rect};
use image::{GrayImage, Luma};

use crate::error::QuantError;

/// Mask value for pixels inside the region.
const INSIDE: u8 = 255;

/// A named polygonal region of interest in raster pixel coordinates.
///
/// Vertices follow the pixel-corner convention: pixel `(x, y)` covers the
/// square `[x, x+1) × [y, y+1)` and belongs to the region when its centre
/// lies inside the polygon. Interior rings are holes.
#[derive(Clone, Debug, PartialEq)]
pub struct Roi {
    name: String,
    polygon: Polygon<f64>,
}

impl Roi {
    /// Creates a region from its exterior ring.
    ///
    /// The ring is closed automatically. At least three distinct, finite
    /// vertices are required.
    pub fn new(name: impl Into<String>, vertices: Vec<(f64, f64)>) -> Result<Self, QuantError> {
        let exterior: LineString<f64> = vertices
            .into_iter()
            .map(|(x, y)| coord! { x: x, y: y })
            .collect::<Vec<Coord<f64>>>()
            .into();
        Self::from_polygon(name, Polygon::new(exterior, vec![]))
    }

    /// Creates a region from an existing polygon, which may have holes.
    pub fn from_polygon(name: impl Into<String>, polygon: Polygon<f64>) -> Result<Self, QuantError> {
        let name = name.into();

        if polygon
            .exterior()
            .coords()
            .chain(polygon.interiors().iter().flat_map(|ring| ring.coords()))
            .any(|c| !c.x.is_finite() || !c.y.is_finite())
        {
            return Err(QuantError::InvalidRoi {
                name,
                message: "vertex coordinates must be finite".into(),
            });
        }

        let mut distinct: Vec<Coord<f64>> = Vec::new();
        for c in polygon.exterior().coords() {
            if !distinct.contains(c) {
                distinct.push(*c);
            }
        }
        if distinct.len() < 3 {
            return Err(QuantError::InvalidRoi {
                name,
                message: format!(
                    "a polygon needs at least 3 distinct vertices, got {}",
                    distinct.len()
                ),
            });
        }

        Ok(Self { name, polygon })
    }

    /// Returns the region name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the underlying polygon.
    pub fn polygon(&self) -> &Polygon<f64> {
        &self.polygon
    }

    /// Axis-aligned bounding box of the exterior ring.
    pub fn bounding_box(&self) -> Rect<f64> {
        // from_polygon guarantees a non-empty exterior
        self.polygon
            .bounding_rect()
            .unwrap_or_else(|| Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 0.0, y: 0.0 }))
    }

    /// Returns a copy shifted by `(dx, dy)`, keeping the name.
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            name: self.name.clone(),
            polygon: self.polygon.map_coords(|c| coord! { x: c.x + dx, y: c.y + dy }),
        }
    }

    /// Checks that the region covers part of a raster of the given size.
    ///
    /// Regions running past the raster edge are accepted; [`Roi::rasterize`]
    /// clips them. Only a region whose bounding box misses the raster
    /// entirely is rejected.
    pub fn check_overlaps(&self, width: u32, height: u32) -> Result<(), QuantError> {
        let bbox = self.bounding_box();
        if bbox.max().x <= 0.0
            || bbox.max().y <= 0.0
            || bbox.min().x >= width as f64
            || bbox.min().y >= height as f64
        {
            return Err(QuantError::DimensionMismatch(format!(
                "ROI '{}' spans ({:.1}, {:.1})-({:.1}, {:.1}) outside the {}x{} raster",
                self.name,
                bbox.min().x,
                bbox.min().y,
                bbox.max().x,
                bbox.max().y,
                width,
                height
            )));
        }
        Ok(())
    }

    /// Rasterizes the region onto a `width × height` grid.
    ///
    /// Parts of the polygon outside the grid are clipped away.
    pub fn rasterize(&self, width: u32, height: u32) -> RoiMask {
        let mut mask = GrayImage::new(width, height);
        if width == 0 || height == 0 {
            return RoiMask { mask };
        }

        let edges: Vec<(Coord<f64>, Coord<f64>)> = std::iter::once(self.polygon.exterior())
            .chain(self.polygon.interiors().iter())
            .flat_map(|ring| ring.lines().map(|line| (line.start, line.end)))
            .collect();

        let bbox = self.bounding_box();
        let row_start = bbox.min().y.floor().max(0.0) as u32;
        let row_end = (bbox.max().y.ceil().max(0.0) as u32).min(height);

        let mut crossings: Vec<f64> = Vec::new();
        for y in row_start..row_end {
            let cy = y as f64 + 0.5;
            crossings.clear();
            for (a, b) in &edges {
                if (a.y <= cy) != (b.y <= cy) {
                    crossings.push(a.x + (cy - a.y) * (b.x - a.x) / (b.y - a.y));
                }
            }
            crossings.sort_by(|l, r| l.total_cmp(r));

            // Even-odd rule: fill between successive pairs of crossings
            for span in crossings.chunks_exact(2) {
                let first = (span[0] - 0.5).ceil().max(0.0);
                let last = (span[1] - 0.5).ceil().min(width as f64);
                if first >= last {
                    continue;
                }
                for x in first as u32..last as u32 {
                    mask.put_pixel(x, y, Luma([INSIDE]));
                }
            }
        }

        RoiMask { mask }
    }
}

/// Binary pixel mask of a [`Roi`]: 255 inside, 0 outside.
#[derive(Clone, Debug)]
pub struct RoiMask {
    mask: GrayImage,
}

impl RoiMask {
    /// Returns true if pixel `(x, y)` lies inside the region.
    ///
    /// Pixels outside the grid are reported as outside.
    #[inline]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.mask.width() && y < self.mask.height() && self.mask.get_pixel(x, y)[0] == INSIDE
    }

    /// Number of pixels inside the region.
    pub fn pixel_count(&self) -> u64 {
        self.mask.pixels().filter(|p| p[0] == INSIDE).count() as u64
    }

    /// Grid dimensions `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    /// Borrows the mask as an 8-bit image.
    pub fn as_image(&self) -> &GrayImage {
        &self.mask
    }
}
