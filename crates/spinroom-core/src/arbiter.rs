use spinroom_models::control::ControlId;
use spinroom_models::room::ControlOwnership;
use std::collections::HashMap;

/// An ownership not refreshed by movement for this long is cleared by
/// the periodic sweep.
pub const OWNERSHIP_TTL_MS: i64 = 2000;

/// Soft-lock arbitration over the room's `control_owners` map. These
/// are advisory locks for cursor/handle rendering: the last grabber
/// always wins, and non-owners are never rejected.
///
/// All functions run inside the per-room serialized path.
pub fn grab(
    owners: &mut HashMap<ControlId, ControlOwnership>,
    control: ControlId,
    client_id: &str,
    now_ms: i64,
) -> ControlOwnership {
    let ownership = owners
        .entry(control)
        .and_modify(|own| {
            if own.client_id == client_id {
                own.last_moved_at = now_ms;
            } else {
                // Soft-lock override: another client takes the control.
                *own = ControlOwnership {
                    client_id: client_id.to_string(),
                    acquired_at: now_ms,
                    last_moved_at: now_ms,
                };
            }
        })
        .or_insert_with(|| ControlOwnership {
            client_id: client_id.to_string(),
            acquired_at: now_ms,
            last_moved_at: now_ms,
        });
    ownership.clone()
}

/// Remove the ownership only when `client_id` currently holds it.
/// Returns whether anything was released.
pub fn release(
    owners: &mut HashMap<ControlId, ControlOwnership>,
    control: ControlId,
    client_id: &str,
) -> bool {
    match owners.get(&control) {
        Some(own) if own.client_id == client_id => {
            owners.remove(&control);
            true
        }
        _ => false,
    }
}

/// Drop every ownership older than the TTL; returns the cleared ids so
/// the caller can broadcast the ownership-cleared events.
pub fn sweep_expired(
    owners: &mut HashMap<ControlId, ControlOwnership>,
    now_ms: i64,
) -> Vec<ControlId> {
    let expired: Vec<ControlId> = owners
        .iter()
        .filter(|(_, own)| now_ms - own.last_moved_at > OWNERSHIP_TTL_MS)
        .map(|(control, _)| *control)
        .collect();
    for control in &expired {
        owners.remove(control);
    }
    expired
}

/// Free every control held by a disconnecting client; returns the
/// freed ids for broadcast.
pub fn release_all(
    owners: &mut HashMap<ControlId, ControlOwnership>,
    client_id: &str,
) -> Vec<ControlId> {
    let freed: Vec<ControlId> = owners
        .iter()
        .filter(|(_, own)| own.client_id == client_id)
        .map(|(control, _)| *control)
        .collect();
    for control in &freed {
        owners.remove(control);
    }
    freed
}
