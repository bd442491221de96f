use crate::arbiter;
use crate::error::CoreError;
use crate::events::RoomBus;
use crate::rate_limit::RateCategory;
use crate::store::Room;
use spinroom_models::control::ControlId;
use spinroom_models::deck::{PlayState, PLAYBACK_RATE_MAX, PLAYBACK_RATE_MIN};
use spinroom_models::protocol::{
    ClientEnvelope, ClientEvent, ServerMessage, ServerMutationEvent, ServerSignal,
};
use spinroom_models::queue::QueueItem;
use spinroom_models::room::ControlOwnership;

/// Upper bound on queued tracks per room.
pub const QUEUE_MAX: usize = 100;

#[derive(Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Event mutated state; `version` is the post-apply room version.
    Applied { version: u64, event_id: String },
    /// Retry of an already-applied event; acknowledged without
    /// re-applying.
    Duplicate { version: u64 },
}

impl ApplyOutcome {
    pub fn version(&self) -> u64 {
        match self {
            ApplyOutcome::Applied { version, .. } => *version,
            ApplyOutcome::Duplicate { version } => *version,
        }
    }
}

/// Apply one client mutation to a room. Runs with the room lock held,
/// so the pipeline is strictly serialized per room: rate limit, then
/// duplicate detection, then validation and mutation, then a single
/// version increment, then broadcast.
///
/// Rejections leave the room untouched; the caller turns the error
/// into a per-sender acknowledgment.
pub fn apply(
    room: &mut Room,
    bus: &RoomBus,
    envelope: ClientEnvelope,
    now_ms: i64,
) -> Result<ApplyOutcome, CoreError> {
    let ClientEnvelope {
        room_id,
        client_id,
        client_seq,
        event_id,
        event,
    } = envelope;

    if room.state.member(&client_id).is_none() {
        return Err(CoreError::Unauthorized);
    }

    if let Some(category) = RateCategory::for_event(&event) {
        room.limiter
            .check_and_record(&client_id, category, now_ms)
            .map_err(|retry_after_ms| CoreError::RateLimited { retry_after_ms })?;
    }

    if room
        .ledger
        .is_duplicate(&client_id, client_seq, event_id.as_deref())
    {
        return Ok(ApplyOutcome::Duplicate {
            version: room.state.version,
        });
    }

    let signals = mutate(room, &client_id, &event, now_ms)?;

    room.state.version += 1;
    let version = room.state.version;
    let event_id = event_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    room.ledger.record(&client_id, client_seq, &event_id);

    bus.publish(ServerMessage::Mutation(ServerMutationEvent {
        room_id,
        client_id,
        client_seq,
        event,
        event_id: event_id.clone(),
        server_ts: now_ms,
        version,
    }));
    for signal in signals {
        bus.publish(ServerMessage::Signal(signal));
    }

    Ok(ApplyOutcome::Applied { version, event_id })
}

/// Validate and apply the event body. Any error leaves the state
/// unmodified; validation happens before the first write.
fn mutate(
    room: &mut Room,
    client_id: &str,
    event: &ClientEvent,
    now_ms: i64,
) -> Result<Vec<ServerSignal>, CoreError> {
    let state = &mut room.state;
    let room_id = state.room_id.clone();
    match event {
        ClientEvent::ControlGrab { control_id } => {
            let ownership =
                arbiter::grab(&mut state.control_owners, *control_id, client_id, now_ms);
            Ok(vec![ownership_signal(room_id, *control_id, Some(ownership))])
        }
        ClientEvent::ControlRelease { control_id } => {
            // Releasing a control someone else took over is a no-op,
            // not an error: the release raced a grab and lost.
            if arbiter::release(&mut state.control_owners, *control_id, client_id) {
                Ok(vec![ownership_signal(room_id, *control_id, None)])
            } else {
                Ok(Vec::new())
            }
        }
        ClientEvent::MixerSet { control_id, value } => {
            control_id
                .validate_value(*value)
                .map_err(|e| CoreError::Validation(e.to_string()))?;
            state.mixer.set(*control_id, *value);
            // Moving a control is an implicit grab, refreshing or
            // taking ownership.
            let ownership =
                arbiter::grab(&mut state.control_owners, *control_id, client_id, now_ms);
            Ok(vec![ownership_signal(room_id, *control_id, Some(ownership))])
        }
        ClientEvent::DeckLoad {
            deck_id,
            track_id,
            queue_item_id,
        } => {
            let idx = state
                .queue_index(queue_item_id)
                .ok_or(CoreError::NotFound("queue item"))?;
            if state.queue[idx].track_id != *track_id {
                return Err(CoreError::Validation(
                    "queue item does not hold that track".into(),
                ));
            }
            let item = state.queue.remove(idx);
            let deck = state.deck_mut(*deck_id);
            deck.loaded_track_id = Some(item.track_id);
            deck.duration_sec = item.duration_sec;
            deck.play_state = PlayState::Stopped;
            deck.cue_point_sec = 0.0;
            deck.playback_rate = 1.0;
            deck.begin_epoch(0.0, now_ms);
            Ok(Vec::new())
        }
        ClientEvent::DeckPlay { deck_id } => {
            let deck = state.deck_mut(*deck_id);
            if deck.loaded_track_id.is_none() {
                return Err(CoreError::Validation("no track loaded".into()));
            }
            let playhead = deck.playhead_at(now_ms);
            deck.play_state = PlayState::Playing;
            deck.begin_epoch(playhead, now_ms);
            Ok(Vec::new())
        }
        ClientEvent::DeckPause { deck_id } => {
            let deck = state.deck_mut(*deck_id);
            let playhead = deck.playhead_at(now_ms);
            deck.play_state = PlayState::Paused;
            deck.begin_epoch(playhead, now_ms);
            Ok(Vec::new())
        }
        ClientEvent::DeckCue {
            deck_id,
            cue_point_sec,
        } => {
            let deck = state.deck_mut(*deck_id);
            if let Some(point) = cue_point_sec {
                if !point.is_finite() || *point < 0.0 || *point > deck.duration_sec {
                    return Err(CoreError::Validation("cue point out of range".into()));
                }
                deck.cue_point_sec = *point;
            }
            let cue = deck.cue_point_sec;
            deck.play_state = PlayState::Cued;
            deck.begin_epoch(cue, now_ms);
            Ok(Vec::new())
        }
        ClientEvent::DeckSeek {
            deck_id,
            position_sec,
        } => {
            if !position_sec.is_finite() {
                return Err(CoreError::Validation("seek position out of range".into()));
            }
            let deck = state.deck_mut(*deck_id);
            let target = if deck.duration_sec > 0.0 {
                position_sec.clamp(0.0, deck.duration_sec)
            } else {
                position_sec.max(0.0)
            };
            deck.begin_epoch(target, now_ms);
            Ok(Vec::new())
        }
        ClientEvent::DeckTempoSet {
            deck_id,
            playback_rate,
        } => {
            if !playback_rate.is_finite()
                || *playback_rate < PLAYBACK_RATE_MIN
                || *playback_rate > PLAYBACK_RATE_MAX
            {
                return Err(CoreError::Validation(format!(
                    "playback rate must be within [{PLAYBACK_RATE_MIN}, {PLAYBACK_RATE_MAX}]"
                )));
            }
            // Anchor the playhead under the old rate before switching,
            // so the rate change itself causes no position jump.
            let deck = state.deck_mut(*deck_id);
            let playhead = deck.playhead_at(now_ms);
            deck.playback_rate = *playback_rate;
            deck.begin_epoch(playhead, now_ms);
            Ok(Vec::new())
        }
        ClientEvent::QueueAdd {
            track_id,
            title,
            duration_sec,
        } => {
            if title.trim().is_empty() {
                return Err(CoreError::Validation("title must not be empty".into()));
            }
            if !duration_sec.is_finite() || *duration_sec <= 0.0 {
                return Err(CoreError::Validation("duration must be positive".into()));
            }
            if state.queue.len() >= QUEUE_MAX {
                return Err(CoreError::Validation(format!(
                    "queue is full ({QUEUE_MAX} tracks)"
                )));
            }
            state.queue.push(QueueItem {
                queue_item_id: uuid::Uuid::new_v4().to_string(),
                track_id: track_id.clone(),
                title: title.trim().to_string(),
                duration_sec: *duration_sec,
                added_by: client_id.to_string(),
                added_at: now_ms,
            });
            Ok(Vec::new())
        }
        ClientEvent::QueueRemove { queue_item_id } => {
            let idx = state
                .queue_index(queue_item_id)
                .ok_or(CoreError::NotFound("queue item"))?;
            state.queue.remove(idx);
            Ok(Vec::new())
        }
        ClientEvent::QueueReorder {
            queue_item_id,
            to_index,
        } => {
            let idx = state
                .queue_index(queue_item_id)
                .ok_or(CoreError::NotFound("queue item"))?;
            let item = state.queue.remove(idx);
            let dest = (*to_index).min(state.queue.len());
            state.queue.insert(dest, item);
            Ok(Vec::new())
        }
        ClientEvent::QueueEdit {
            queue_item_id,
            title,
        } => {
            if title.trim().is_empty() {
                return Err(CoreError::Validation("title must not be empty".into()));
            }
            let idx = state
                .queue_index(queue_item_id)
                .ok_or(CoreError::NotFound("queue item"))?;
            state.queue[idx].title = title.trim().to_string();
            Ok(Vec::new())
        }
        ClientEvent::FxSet { param, value } => {
            if param.trim().is_empty() {
                return Err(CoreError::Validation("fx param must not be empty".into()));
            }
            if !value.is_finite() || !(0.0..=1.0).contains(value) {
                return Err(CoreError::Validation(
                    "fx value must be within [0, 1]".into(),
                ));
            }
            state.mixer.fx.insert(param.trim().to_string(), *value);
            Ok(Vec::new())
        }
        ClientEvent::FxToggle { enabled } => {
            state.mixer.fx_enabled = *enabled;
            Ok(Vec::new())
        }
        // Handled at the socket layer; never routed here.
        ClientEvent::TimePing { .. } | ClientEvent::CursorMove { .. } => Err(
            CoreError::Validation("event is not a room mutation".into()),
        ),
    }
}

fn ownership_signal(
    room_id: String,
    control_id: ControlId,
    ownership: Option<ControlOwnership>,
) -> ServerSignal {
    ServerSignal::ControlOwnership {
        room_id,
        control_id,
        ownership,
    }
}
