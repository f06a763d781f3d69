// =============================================================================
// diff.rs — THE MARKER WALK
// =============================================================================
//
// The algorithmic heart of the monitor. Given the fetched movement list
// (newest-first, by construction of the provider) and the case's last
// persisted marker, derive the batch of movements that are both NEW and
// RELEVANT — and nothing else, ever.
//
// The one rule that makes this correct: walk front-to-back and STOP at the
// first item that is not newer than the marker. The provider returns
// movements in non-increasing (date, id) order, so the first non-newer
// item marks the boundary of what's already known; everything behind it
// was seen on a previous run. This is not a performance trick that can be
// swapped for a full scan — a full scan would happily resurrect old
// movements after a provider ordering glitch, and "persisted exactly
// once" would quietly become "persisted again, with feeling."
//
// Relevance never affects the stop condition. A newer-but-boring item is
// dropped from the batch, but the walk continues past it.
// =============================================================================

use crate::classifier;
use crate::models::{FetchedMovement, Marker, MovementType};

/// A movement that survived the walk: newer than the marker and relevant.
/// Carries the classified type so persistence doesn't re-run the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub movement: FetchedMovement,
    pub movement_type: MovementType,
}

/// Is this item strictly newer than the marker?
///
/// Newer means `date > marker.date`, or same date with a larger
/// source-assigned id. A case with no marker yet (`date == None`) finds
/// everything newer.
pub fn is_newer(movement: &FetchedMovement, marker: Marker) -> bool {
    match marker.date {
        None => true,
        Some(last_date) => {
            movement.date > last_date
                || (movement.date == last_date && movement.external_id > marker.external_id)
        }
    }
}

/// Walk the fetched list and collect the new relevant movements,
/// newest-first. Possibly empty; never reordered.
pub fn new_relevant_movements(fetched: &[FetchedMovement], marker: Marker) -> Vec<NewMovement> {
    let mut batch = Vec::new();

    for movement in fetched {
        if !is_newer(movement, marker) {
            // Boundary of the already-known. Everything past here was
            // persisted on an earlier run.
            break;
        }

        let verdict = classifier::classify(&movement.classification_text());
        if verdict.is_relevant {
            batch.push(NewMovement {
                movement: movement.clone(),
                movement_type: verdict.movement_type,
            });
        }
    }

    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn mv(id: i64, d: u32, tipo: &str) -> FetchedMovement {
        FetchedMovement {
            external_id: id,
            date: day(d),
            tipo: tipo.to_string(),
            conteudo: format!("{tipo} nos autos"),
        }
    }

    fn marker(d: u32, id: i64) -> Marker {
        Marker {
            date: Some(day(d)),
            external_id: id,
        }
    }

    #[test]
    fn test_empty_fetch_gives_empty_batch() {
        assert!(new_relevant_movements(&[], Marker::NONE).is_empty());
    }

    #[test]
    fn test_no_marker_takes_all_relevant_items() {
        let fetched = vec![
            mv(3, 15, "Sentença"),
            mv(2, 12, "Despacho"),
            mv(1, 10, "Intimação"),
        ];
        let batch = new_relevant_movements(&fetched, Marker::NONE);
        assert_eq!(batch.len(), 3);
        // Newest-first order preserved.
        assert_eq!(batch[0].movement.external_id, 3);
        assert_eq!(batch[2].movement.external_id, 1);
    }

    #[test]
    fn test_all_known_gives_empty_batch() {
        let fetched = vec![mv(5, 10, "Sentença"), mv(4, 9, "Despacho")];
        let batch = new_relevant_movements(&fetched, marker(10, 5));
        assert!(batch.is_empty());
    }

    #[test]
    fn test_scenario_b_same_date_tiebreak_and_stop() {
        // Marker (2024-01-10, 55). Fetch: id 60 (Jan 15), id 56 (Jan 11),
        // id 55 (Jan 10), id 54 (Jan 10). Walk takes 60 and 56, stops at
        // 55 (same date, id not greater), never looks at 54.
        let fetched = vec![
            mv(60, 15, "Despacho"),
            mv(56, 11, "Sentença"),
            mv(55, 10, "Sentença"),
            mv(54, 10, "Sentença"),
        ];
        let batch = new_relevant_movements(&fetched, marker(10, 55));
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].movement.external_id, 60);
        assert_eq!(batch[1].movement.external_id, 56);
    }

    #[test]
    fn test_same_date_larger_id_is_newer() {
        let fetched = vec![mv(56, 10, "Despacho")];
        let batch = new_relevant_movements(&fetched, marker(10, 55));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_stop_invariant_shadows_later_newer_items() {
        // A provider ordering glitch puts a not-newer item at position 1
        // in front of an item that WOULD qualify. The walk must stop at
        // position 1 and never include position 2 — the short-circuit is
        // the contract, not a scan optimization.
        let fetched = vec![
            mv(60, 15, "Sentença"),
            mv(50, 9, "Sentença"),  // not newer — boundary
            mv(58, 14, "Sentença"), // newer, but unreachable
        ];
        let batch = new_relevant_movements(&fetched, marker(10, 55));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].movement.external_id, 60);
    }

    #[test]
    fn test_irrelevant_newer_items_are_dropped_but_do_not_stop_the_walk() {
        let fetched = vec![
            mv(60, 15, "Juntada"), // newer, irrelevant
            mv(59, 14, "Sentença"),
            mv(55, 10, "Sentença"), // boundary
        ];
        let batch = new_relevant_movements(&fetched, marker(10, 55));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].movement.external_id, 59);
        assert_eq!(batch[0].movement_type, crate::models::MovementType::Sentenca);
    }

    #[test]
    fn test_ordering_invariant_every_emitted_item_is_newer() {
        let m = marker(10, 55);
        let fetched = vec![
            mv(60, 15, "Despacho"),
            mv(57, 10, "Sentença"),
            mv(55, 10, "Sentença"),
        ];
        for item in new_relevant_movements(&fetched, m) {
            assert!(is_newer(&item.movement, m));
        }
    }

    #[test]
    fn test_second_walk_with_advanced_marker_is_empty() {
        // Idempotence: run the diff, advance the marker to the newest
        // persisted item, run again on the same fetched list — nothing.
        let fetched = vec![
            mv(60, 15, "Despacho"),
            mv(56, 11, "Sentença"),
            mv(55, 10, "Sentença"),
        ];
        let first = new_relevant_movements(&fetched, marker(10, 55));
        assert_eq!(first.len(), 2);

        let advanced = Marker {
            date: Some(first[0].movement.date),
            external_id: first[0].movement.external_id,
        };
        assert!(new_relevant_movements(&fetched, advanced).is_empty());
    }
}
