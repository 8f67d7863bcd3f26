use crate::routeguide::{Point, Rectangle};

/// Coordinates are stored as degrees multiplied by 10^7.
pub const COORD_FACTOR: f64 = 1e7;

pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Convert an E7 coordinate to degrees.
pub fn format_coordinate(value: i32) -> f64 {
    value as f64 / COORD_FACTOR
}

/// Great-circle distance between two points (haversine), truncated to whole
/// meters.
pub fn distance_meters(start: &Point, end: &Point) -> i32 {
    let lat1 = format_coordinate(start.latitude).to_radians();
    let lat2 = format_coordinate(end.latitude).to_radians();
    let delta_lat = (format_coordinate(end.latitude) - format_coordinate(start.latitude)).to_radians();
    let delta_lon =
        (format_coordinate(end.longitude) - format_coordinate(start.longitude)).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    (EARTH_RADIUS_METERS * c) as i32
}

/// An axis-aligned box normalized from the two arbitrary corners of a
/// [`Rectangle`]. Containment is inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub left: i32,
    pub right: i32,
    pub top: i32,
    pub bottom: i32,
}

impl Bounds {
    pub fn from_rectangle(rect: &Rectangle) -> Self {
        let lo = rect.lo.unwrap_or_default();
        let hi = rect.hi.unwrap_or_default();
        Self {
            left: lo.longitude.min(hi.longitude),
            right: lo.longitude.max(hi.longitude),
            top: lo.latitude.max(hi.latitude),
            bottom: lo.latitude.min(hi.latitude),
        }
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.longitude >= self.left
            && point.longitude <= self.right
            && point.latitude >= self.bottom
            && point.latitude <= self.top
    }
}
