//! Fixed-precision spatial hashing (geohash) for coarse proximity
//! bucketing. Cell containment is only a pre-filter; callers must apply
//! `haversine_km` to get exact distances.

use std::collections::BTreeSet;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Cell precision used for user bucketing. At 6 characters a cell is
/// roughly 1.2 km x 0.6 km.
pub const PRECISION: usize = 6;

const KM_PER_DEG_LAT: f64 = 110.574;
const KM_PER_DEG_LNG_EQUATOR: f64 = 111.320;

const EARTH_RADIUS_KM: f64 = 6371.0088;

pub fn encode(lat: f64, lng: f64, precision: usize) -> String {
    let mut lat_range = (-90.0f64, 90.0f64);
    let mut lng_range = (-180.0f64, 180.0f64);

    let mut cell = String::with_capacity(precision);
    let mut bits: usize = 0;
    let mut bit_count = 0;
    let mut even = true; // longitude first

    while cell.len() < precision {
        if even {
            let mid = (lng_range.0 + lng_range.1) / 2.0;
            if lng >= mid {
                bits = (bits << 1) | 1;
                lng_range.0 = mid;
            } else {
                bits <<= 1;
                lng_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if lat >= mid {
                bits = (bits << 1) | 1;
                lat_range.0 = mid;
            } else {
                bits <<= 1;
                lat_range.1 = mid;
            }
        }
        even = !even;
        bit_count += 1;
        if bit_count == 5 {
            cell.push(BASE32[bits] as char);
            bits = 0;
            bit_count = 0;
        }
    }

    cell
}

/// (height, width) of a cell in degrees at the given precision.
/// Longitude gets the extra bit when the total is odd.
pub fn cell_size_deg(precision: usize) -> (f64, f64) {
    let total_bits = 5 * precision;
    let lng_bits = total_bits / 2 + total_bits % 2;
    let lat_bits = total_bits / 2;
    (
        180.0 / (1u64 << lat_bits) as f64,
        360.0 / (1u64 << lng_bits) as f64,
    )
}

/// The set of cells covering the bounding box of `radius_km` around a
/// point. Stepping the grid across the whole box keeps true positives
/// just over a cell boundary from being lost; the resulting false
/// positives are removed later by exact distance.
pub fn covering_cells(lat: f64, lng: f64, radius_km: f64, precision: usize) -> Vec<String> {
    let deg_lat = radius_km / KM_PER_DEG_LAT;
    let lng_scale = (KM_PER_DEG_LNG_EQUATOR * lat.to_radians().cos()).max(1e-6);
    let deg_lng = radius_km / lng_scale;

    let (cell_h, cell_w) = cell_size_deg(precision);

    let lat_min = (lat - deg_lat).max(-90.0);
    let lat_max = (lat + deg_lat).min(90.0);
    let lng_min = (lng - deg_lng).max(-180.0);
    let lng_max = (lng + deg_lng).min(180.0);

    let mut cells = BTreeSet::new();
    let mut cur_lat = lat_min;
    while cur_lat <= lat_max + cell_h {
        let mut cur_lng = lng_min;
        while cur_lng <= lng_max + cell_w {
            cells.insert(encode(cur_lat.min(lat_max), cur_lng.min(lng_max), precision));
            cur_lng += cell_w;
        }
        cur_lat += cell_h;
    }

    cells.into_iter().collect()
}

/// Great-circle distance between two points, in km.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_known_point() {
        // Reference vector for geohash encoding
        assert_eq!(encode(57.64911, 10.40744, 11), "u4pruydqqvj");
        assert_eq!(encode(57.64911, 10.40744, PRECISION), "u4pruy");
    }

    #[test]
    fn encodes_poles_and_antimeridian_without_panic() {
        assert_eq!(encode(90.0, 180.0, 1).len(), 1);
        assert_eq!(encode(-90.0, -180.0, PRECISION).len(), PRECISION);
    }

    #[test]
    fn haversine_known_distance() {
        // Paris <-> London
        let d = haversine_km(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((335.0..355.0).contains(&d), "got {}", d);
    }

    #[test]
    fn haversine_zero_for_same_point() {
        assert!(haversine_km(40.0, -74.0, 40.0, -74.0) < 1e-9);
    }

    #[test]
    fn covering_includes_center_cell() {
        let cells = covering_cells(40.7589, -73.9851, 2.0, PRECISION);
        assert!(cells.contains(&encode(40.7589, -73.9851, PRECISION)));
    }

    #[test]
    fn covering_includes_neighbor_across_boundary() {
        // A point ~1 km north can land in a different cell; the covering
        // set for a 2 km radius must still include it.
        let (lat, lng) = (40.7589, -73.9851);
        let neighbor_lat = lat + 1.0 / KM_PER_DEG_LAT;
        let cells = covering_cells(lat, lng, 2.0, PRECISION);
        assert!(cells.contains(&encode(neighbor_lat, lng, PRECISION)));
    }

    #[test]
    fn covering_grows_with_radius() {
        let small = covering_cells(40.7589, -73.9851, 1.0, PRECISION);
        let large = covering_cells(40.7589, -73.9851, 5.0, PRECISION);
        assert!(large.len() > small.len());
        for cell in &small {
            assert!(large.contains(cell));
        }
    }
}
