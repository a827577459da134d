//! Object model for collection items.
//!
//! Every item carries a [`GeoObject`]: either a spatial geometry (point,
//! polyline, polygon, multi-geometry, circle, feature) or an opaque string
//! value. String values never enter the spatial index; they are ordered
//! lexicographically instead.

use bytes::Bytes;
use geo::{coord, BoundingRect, Geometry, LineString, MultiPoint, Point, Polygon, Rect, Relate};
use serde::{Deserialize, Serialize};

use crate::geodesy;

/// Number of vertices used when a circle is expanded to a polygon for
/// geometry predicates.
const CIRCLE_STEPS: usize = 64;

/// A circle on the sphere: a lon/lat center and a radius in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    center: Point,
    meters: f64,
}

impl Circle {
    pub fn new(center: Point, meters: f64) -> Circle {
        Circle { center, meters }
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn meters(&self) -> f64 {
        self.meters
    }

    /// Spherical polygon approximation used for non-point comparisons.
    fn to_polygon(&self) -> Polygon {
        let mut coords = Vec::with_capacity(CIRCLE_STEPS + 1);
        for i in 0..CIRCLE_STEPS {
            let bearing = 360.0 * i as f64 / CIRCLE_STEPS as f64;
            let p = geodesy::destination(self.center, self.meters, bearing);
            coords.push(coord! { x: p.x(), y: p.y() });
        }
        coords.push(coords[0]);
        Polygon::new(LineString::from(coords), vec![])
    }
}

/// A spatial geometry or an opaque string value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeoObject {
    Point(Point),
    MultiPoint(MultiPoint),
    LineString(LineString),
    Polygon(Polygon),
    Rect(Rect),
    Circle(Circle),
    /// Multi-geometry: an ordered group of member objects.
    Collection(Vec<GeoObject>),
    /// A geometry with attached properties.
    Feature {
        geometry: Box<GeoObject>,
        properties: Option<serde_json::Value>,
    },
    /// Opaque value; participates only in value-ordered scans.
    String(Bytes),
}

impl GeoObject {
    /// Convenience constructor for a string value object.
    pub fn string(value: impl Into<Bytes>) -> GeoObject {
        GeoObject::String(value.into())
    }

    /// True for every variant except `String`.
    pub fn is_spatial(&self) -> bool {
        !matches!(self, GeoObject::String(_))
    }

    /// True when the object has no spatial extent to index.
    pub fn is_empty(&self) -> bool {
        match self {
            GeoObject::Point(_) | GeoObject::Rect(_) | GeoObject::Circle(_) => false,
            GeoObject::MultiPoint(mp) => mp.0.is_empty(),
            GeoObject::LineString(ls) => ls.0.is_empty(),
            GeoObject::Polygon(p) => p.exterior().0.is_empty(),
            GeoObject::Collection(objs) => objs.iter().all(|o| o.is_empty()),
            GeoObject::Feature { geometry, .. } => geometry.is_empty(),
            GeoObject::String(_) => true,
        }
    }

    /// Minimum bounding rectangle, or `None` for strings and empty shapes.
    pub fn rect(&self) -> Option<Rect> {
        match self {
            GeoObject::Point(p) => Some(Rect::new(p.0, p.0)),
            GeoObject::MultiPoint(mp) => mp.bounding_rect(),
            GeoObject::LineString(ls) => ls.bounding_rect(),
            GeoObject::Polygon(p) => p.bounding_rect(),
            GeoObject::Rect(r) => Some(*r),
            GeoObject::Circle(c) => Some(geodesy::rect_from_center(c.center, c.meters)),
            GeoObject::Collection(objs) => {
                let mut acc: Option<Rect> = None;
                for rect in objs.iter().filter_map(|o| o.rect()) {
                    acc = Some(match acc {
                        None => rect,
                        Some(prev) => Rect::new(
                            coord! {
                                x: prev.min().x.min(rect.min().x),
                                y: prev.min().y.min(rect.min().y),
                            },
                            coord! {
                                x: prev.max().x.max(rect.max().x),
                                y: prev.max().y.max(rect.max().y),
                            },
                        ),
                    });
                }
                acc
            }
            GeoObject::Feature { geometry, .. } => geometry.rect(),
            GeoObject::String(_) => None,
        }
    }

    /// Center point. Circles report their true center; everything else the
    /// center of its bounding rectangle.
    pub fn center(&self) -> Point {
        match self {
            GeoObject::Circle(c) => c.center,
            _ => self
                .rect()
                .map(|r| r.center().into())
                .unwrap_or_else(|| Point::new(0.0, 0.0)),
        }
    }

    /// Coordinate count used for memory-weight accounting.
    pub fn num_points(&self) -> usize {
        match self {
            GeoObject::Point(_) | GeoObject::Circle(_) => 1,
            GeoObject::MultiPoint(mp) => mp.0.len(),
            GeoObject::LineString(ls) => ls.0.len(),
            GeoObject::Polygon(p) => {
                p.exterior().0.len() + p.interiors().iter().map(|r| r.0.len()).sum::<usize>()
            }
            GeoObject::Rect(_) => 2,
            GeoObject::Collection(objs) => objs.iter().map(|o| o.num_points()).sum(),
            GeoObject::Feature { geometry, .. } => geometry.num_points(),
            GeoObject::String(_) => 0,
        }
    }

    /// The raw value for `String` objects.
    pub fn string_value(&self) -> Option<&[u8]> {
        match self {
            GeoObject::String(value) => Some(value),
            _ => None,
        }
    }

    pub(crate) fn value_bytes(&self) -> Bytes {
        match self {
            GeoObject::String(value) => value.clone(),
            _ => Bytes::new(),
        }
    }

    /// True when `self` is fully contained within `other`.
    pub fn within(&self, other: &GeoObject) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        match (self, other) {
            (GeoObject::Collection(objs), _) => objs.iter().all(|o| o.within(other)),
            (GeoObject::Feature { geometry, .. }, _) => geometry.within(other),
            (_, GeoObject::Collection(objs)) => objs.iter().any(|o| self.within(o)),
            (_, GeoObject::Feature { geometry, .. }) => self.within(geometry),
            (GeoObject::Point(p), GeoObject::Point(q)) => p == q,
            (GeoObject::Point(p), GeoObject::Rect(r)) => rect_contains_point(r, p),
            (GeoObject::Rect(a), GeoObject::Rect(b)) => rect_contains_rect(b, a),
            (GeoObject::Point(p), GeoObject::Circle(c)) => {
                geodesy::haversine(*p, c.center) <= c.meters
            }
            (GeoObject::Circle(a), GeoObject::Circle(b)) => {
                geodesy::haversine(a.center, b.center) + a.meters <= b.meters
            }
            _ => match (self.to_geometry(), other.to_geometry()) {
                (Some(a), Some(b)) => a.relate(&b).is_within(),
                _ => false,
            },
        }
    }

    /// True when `self` and `other` share any point.
    pub fn intersects(&self, other: &GeoObject) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        match (self, other) {
            (GeoObject::Collection(objs), _) => objs.iter().any(|o| o.intersects(other)),
            (_, GeoObject::Collection(objs)) => objs.iter().any(|o| self.intersects(o)),
            (GeoObject::Feature { geometry, .. }, _) => geometry.intersects(other),
            (_, GeoObject::Feature { geometry, .. }) => self.intersects(geometry),
            (GeoObject::Point(p), GeoObject::Point(q)) => p == q,
            (GeoObject::Point(p), GeoObject::Rect(r))
            | (GeoObject::Rect(r), GeoObject::Point(p)) => rect_contains_point(r, p),
            (GeoObject::Rect(a), GeoObject::Rect(b)) => rects_overlap(a, b),
            (GeoObject::Point(p), GeoObject::Circle(c))
            | (GeoObject::Circle(c), GeoObject::Point(p)) => {
                geodesy::haversine(*p, c.center) <= c.meters
            }
            (GeoObject::Circle(a), GeoObject::Circle(b)) => {
                geodesy::haversine(a.center, b.center) <= a.meters + b.meters
            }
            _ => match (self.to_geometry(), other.to_geometry()) {
                (Some(a), Some(b)) => a.relate(&b).is_intersects(),
                _ => false,
            },
        }
    }

    fn to_geometry(&self) -> Option<Geometry> {
        match self {
            GeoObject::Point(p) => Some(Geometry::Point(*p)),
            GeoObject::MultiPoint(mp) => Some(Geometry::MultiPoint(mp.clone())),
            GeoObject::LineString(ls) => Some(Geometry::LineString(ls.clone())),
            GeoObject::Polygon(p) => Some(Geometry::Polygon(p.clone())),
            GeoObject::Rect(r) => Some(Geometry::Polygon(r.to_polygon())),
            GeoObject::Circle(c) if c.meters > 0.0 => Some(Geometry::Polygon(c.to_polygon())),
            GeoObject::Circle(c) => Some(Geometry::Point(c.center)),
            GeoObject::Feature { geometry, .. } => geometry.to_geometry(),
            GeoObject::Collection(_) | GeoObject::String(_) => None,
        }
    }
}

fn rect_contains_point(r: &Rect, p: &Point) -> bool {
    p.x() >= r.min().x && p.x() <= r.max().x && p.y() >= r.min().y && p.y() <= r.max().y
}

fn rect_contains_rect(outer: &Rect, inner: &Rect) -> bool {
    inner.min().x >= outer.min().x
        && inner.max().x <= outer.max().x
        && inner.min().y >= outer.min().y
        && inner.max().y <= outer.max().y
}

fn rects_overlap(a: &Rect, b: &Rect) -> bool {
    a.min().x <= b.max().x
        && a.max().x >= b.min().x
        && a.min().y <= b.max().y
        && a.max().y >= b.min().y
}
