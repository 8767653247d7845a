//! Proximity Finder — coarse geocell pre-filter, exact haversine
//! post-filter, then preference compatibility.

use anyhow::Result;
use chrono::{DateTime, Datelike, Utc};
use tracing::warn;
use uuid::Uuid;

use mingle_db::models::UserRow;
use mingle_db::{Database, parse_ts_opt};
use mingle_types::models::{Gender, LookingFor};

use crate::geocell;

/// One browsable nearby user. `distance_km` is annotation for display; it
/// does not affect ordering within this core.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub user_id: Uuid,
    pub display_name: String,
    pub gender: Gender,
    pub age: i32,
    pub venue_id: Uuid,
    pub distance_km: f64,
}

pub fn find_candidates(
    db: &Database,
    viewer: &UserRow,
    radius_km: Option<f64>,
    now: DateTime<Utc>,
) -> Result<Vec<Candidate>> {
    let (Some(lat), Some(lng)) = (viewer.lat, viewer.lng) else {
        return Ok(vec![]);
    };

    // Requested radius is capped by the viewer's own distance preference
    let radius = radius_km
        .map(|r| r.min(viewer.max_distance_km))
        .unwrap_or(viewer.max_distance_km);

    let Some((viewer_gender, viewer_looking)) = parse_prefs(viewer) else {
        return Ok(vec![]);
    };
    let viewer_age = age_of(viewer.birth_year, now);

    let cells = geocell::covering_cells(lat, lng, radius, geocell::PRECISION);
    let rows = db.candidates_in_cells(&viewer.id, &cells)?;

    let mut out = Vec::new();
    for row in rows {
        let (Some(c_lat), Some(c_lng)) = (row.lat, row.lng) else {
            continue;
        };

        // Expired check-ins awaiting the reaper are not browsable
        if let Some(expires_at) = parse_ts_opt(row.checkin_expires_at.as_deref()) {
            if now > expires_at {
                continue;
            }
        }

        // Cell containment admits false positives near the boundary;
        // exact distance is the authority
        let distance_km = geocell::haversine_km(lat, lng, c_lat, c_lng);
        if distance_km > radius {
            continue;
        }

        let Some((c_gender, c_looking)) = parse_prefs(&row) else {
            continue;
        };
        let mutual =
            viewer_looking.admits(c_gender) && c_looking.admits(viewer_gender);
        if !mutual {
            continue;
        }

        let c_age = age_of(row.birth_year, now);
        let age_ok = (viewer.min_age..=viewer.max_age).contains(&(c_age as i64))
            && (row.min_age..=row.max_age).contains(&(viewer_age as i64));
        if !age_ok {
            continue;
        }

        let (Ok(user_id), Some(venue_id)) = (
            row.id.parse::<Uuid>(),
            row.checked_in_venue.as_deref().and_then(|v| v.parse::<Uuid>().ok()),
        ) else {
            warn!("Skipping candidate '{}' with corrupt ids", row.id);
            continue;
        };

        out.push(Candidate {
            user_id,
            display_name: row.display_name,
            gender: c_gender,
            age: c_age,
            venue_id,
            distance_km,
        });
    }

    Ok(out)
}

fn parse_prefs(row: &UserRow) -> Option<(Gender, LookingFor)> {
    match (Gender::parse(&row.gender), LookingFor::parse(&row.looking_for)) {
        (Some(g), Some(l)) => Some((g, l)),
        _ => {
            warn!("User '{}' has unparseable preferences", row.id);
            None
        }
    }
}

fn age_of(birth_year: i64, now: DateTime<Utc>) -> i32 {
    (now.year() as i64 - birth_year).max(0) as i32
}
