//! In-memory geospatial collection engine.
//!
//! A [`Collection`] holds keyed items that are either geometries (points,
//! polylines, polygons, multi-geometries, circles, features) or opaque
//! string values, each with an ordered vector of numeric fields. Items are
//! indexed three ways: by identifier for ordered scans, by value for lexical
//! range queries over non-geometry items, and by bounding box for spatial
//! region and nearest-neighbor queries. The collection tracks its own
//! in-memory cost as items come and go.
//!
//! ```rust
//! use locus::{Collection, GeoObject, Point};
//!
//! let mut col = Collection::new(false);
//! col.set("truck:1", GeoObject::Point(Point::new(-112.26, 33.52)), None, &[]);
//! col.set("truck:2", GeoObject::Point(Point::new(-112.20, 33.50)), None, &[]);
//!
//! let mut nearest = Vec::new();
//! col.nearby(&GeoObject::Point(Point::new(-112.26, 33.52)), None, |item| {
//!     nearest.push(item.id().to_vec());
//!     true
//! });
//! assert_eq!(nearest[0], b"truck:1");
//! ```
//!
//! Collections hold no internal lock: the host serializes access, typically
//! behind a per-collection read/write lock.

pub mod builder;
pub mod collection;
pub mod geodesy;
pub mod item;
pub mod object;

mod arena;
mod btree;
mod rtree;
mod values;

pub use builder::CollectionBuilder;
pub use collection::{Collection, CollectionStats, Cursor, YIELD_STEP};
pub use item::{Fields, Item};
pub use object::{Circle, GeoObject};

pub use geo::{LineString, MultiPoint, Point, Polygon, Rect};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
