//! Face identification by descriptor distance.
//!
//! Descriptors are 128-dimension embeddings computed client-side by a face
//! model. Matching is a linear scan: the closest stored descriptor wins if
//! its Euclidean distance is strictly below the threshold.

use serde::Serialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::face::FaceDescriptorRow;

pub const DESCRIPTOR_LEN: usize = 128;
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.6;
/// Enrollment cap per user.
pub const MAX_DESCRIPTORS_PER_USER: i64 = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceMatch {
    pub user_id: Uuid,
    pub descriptor_id: Uuid,
    pub distance: f64,
}

pub fn validate_descriptor(descriptor: &[f64]) -> Result<(), AppError> {
    if descriptor.len() != DESCRIPTOR_LEN {
        return Err(AppError::Validation(format!(
            "descriptor must have exactly {DESCRIPTOR_LEN} values, got {}",
            descriptor.len()
        )));
    }
    if descriptor.iter().any(|v| !v.is_finite()) {
        return Err(AppError::Validation(
            "descriptor values must be finite numbers".to_string(),
        ));
    }
    Ok(())
}

/// Plain L2 distance. Callers guarantee equal lengths; extra elements are ignored.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Closest candidate strictly under `threshold`. Ties keep the first seen.
/// Candidates with a malformed stored vector are skipped.
pub fn find_best_match(
    query: &[f64],
    candidates: &[FaceDescriptorRow],
    threshold: f64,
) -> Option<FaceMatch> {
    let mut best: Option<FaceMatch> = None;
    for candidate in candidates {
        if candidate.descriptor.len() != query.len() {
            tracing::warn!(
                "Skipping face descriptor {} with {} values",
                candidate.id,
                candidate.descriptor.len()
            );
            continue;
        }
        let distance = euclidean_distance(query, &candidate.descriptor);
        if distance >= threshold {
            continue;
        }
        let better = best.as_ref().map_or(true, |b| distance < b.distance);
        if better {
            best = Some(FaceMatch {
                user_id: candidate.user_id,
                descriptor_id: candidate.id,
                distance,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(user_id: Uuid, descriptor: Vec<f64>) -> FaceDescriptorRow {
        FaceDescriptorRow {
            id: Uuid::new_v4(),
            user_id,
            label: None,
            descriptor,
            created_at: Utc::now(),
        }
    }

    /// Vector of `DESCRIPTOR_LEN` zeros with `offset` added to the first element.
    fn shifted(offset: f64) -> Vec<f64> {
        let mut v = vec![0.0; DESCRIPTOR_LEN];
        v[0] = offset;
        v
    }

    #[test]
    fn test_distance_known_values() {
        assert_eq!(euclidean_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_eq!(euclidean_distance(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_validate_descriptor_length() {
        assert!(validate_descriptor(&vec![0.1; DESCRIPTOR_LEN]).is_ok());
        assert!(validate_descriptor(&vec![0.1; 127]).is_err());
        assert!(validate_descriptor(&[]).is_err());
    }

    #[test]
    fn test_validate_descriptor_rejects_nan() {
        let mut v = vec![0.0; DESCRIPTOR_LEN];
        v[10] = f64::NAN;
        assert!(validate_descriptor(&v).is_err());
    }

    #[test]
    fn test_best_match_picks_closest_under_threshold() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let candidates = vec![row(alice, shifted(0.5)), row(bob, shifted(0.2))];
        let m = find_best_match(&shifted(0.0), &candidates, DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(m.user_id, bob);
        assert!((m.distance - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_is_strict() {
        let candidates = vec![row(Uuid::new_v4(), shifted(0.6))];
        assert!(find_best_match(&shifted(0.0), &candidates, 0.6).is_none());
    }

    #[test]
    fn test_no_candidates_no_match() {
        assert!(find_best_match(&shifted(0.0), &[], DEFAULT_MATCH_THRESHOLD).is_none());
    }

    #[test]
    fn test_tie_keeps_first() {
        let first = row(Uuid::new_v4(), shifted(0.3));
        let second = row(Uuid::new_v4(), shifted(-0.3));
        let expected = first.id;
        let m = find_best_match(&shifted(0.0), &[first, second], DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(m.descriptor_id, expected);
    }

    #[test]
    fn test_malformed_candidate_skipped() {
        let good = row(Uuid::new_v4(), shifted(0.1));
        let bad = row(Uuid::new_v4(), vec![0.0; 3]);
        let expected = good.user_id;
        let m = find_best_match(&shifted(0.0), &[bad, good], DEFAULT_MATCH_THRESHOLD).unwrap();
        assert_eq!(m.user_id, expected);
    }
}
