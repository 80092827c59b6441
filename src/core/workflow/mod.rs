//! Four-turn workflow orchestrator.
//!
//! Turn 1 (Respond): every assigned slot reflects the visitor's message.
//! Turn 2 (Comment): each surviving slot addresses exactly one peer.
//! Turn 3 (Reply): slots that received comments answer them.
//! Turn 4 (Summary): one agent closes the exchange with a single paragraph.
//!
//! Per-slot work inside a turn runs in parallel; turns are strict barriers.
//! All SSE events flow through one queue per request, terminated by the
//! `Done` sentinel. A slot failure removes it from later turns but never
//! aborts the request.

pub mod models;
pub mod prompts;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::agents::{AgentId, SlotId};
use crate::core::conversations::ConversationStore;
use crate::core::events::{DialogueSpec, EventsHandle};
use crate::core::llm::{ChatMessage, GenerationParams, LlmGateway};
use crate::core::sentiment::analyze_sentiment;
use crate::core::sessions::{
    ManifestComment, ManifestEntry, ManifestSlot, ManifestSummary, SessionManifest, TtsSession,
};
use crate::core::tts::SpeechRenderer;
use crate::core::waves::{SUMMARY_TURN, WaveJob, WaveWorkerPool, waves_output_dir, waves_relative_dir};
use crate::errors::taxonomy::ErrorDetail;

use models::*;
use prompts::{
    DialogueLine, PeerResponse, render_turn1_prompt, render_turn2_prompt,
    render_turn2_retry_prompt, render_turn3_prompt, render_turn4_prompt,
};

/// Maximum comments any single slot receives in its turn-3 prompt.
pub const MAX_COMMENTS_PER_TARGET: usize = 3;

/// Token budget for the summary call; longer than regular turns.
const SUMMARY_MAX_TOKENS: u32 = 400;

/// Everything the workflow needs from the application.
pub struct WorkflowContext {
    pub config: Arc<ServerConfig>,
    pub llm: Arc<LlmGateway>,
    pub tts: Arc<dyn SpeechRenderer>,
    pub conversations: Arc<ConversationStore>,
    pub waves: Arc<WaveWorkerPool>,
    pub events: EventsHandle,
}

impl WorkflowContext {
    fn params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }
}

type EventSender = mpsc::UnboundedSender<QueueItem>;

fn send_event<T: serde::Serialize>(tx: &EventSender, event: &'static str, payload: &T) {
    // A closed receiver just means the client went away; producers carry on.
    let _ = tx.send(QueueItem::Event(SseMessage::new(event, payload)));
}

/// Spawn the workflow for one request. Events arrive on the returned
/// receiver in arrival order; the final item is always `QueueItem::Done`.
pub fn spawn_workflow(
    ctx: Arc<WorkflowContext>,
    session: TtsSession,
    message: String,
    slots: Vec<SlotAssignment>,
) -> mpsc::UnboundedReceiver<QueueItem> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_workflow(ctx, session, message, slots, tx));
    rx
}

async fn run_workflow(
    ctx: Arc<WorkflowContext>,
    session: TtsSession,
    message: String,
    slots: Vec<SlotAssignment>,
    tx: EventSender,
) {
    let session_id = session.session_id.clone();
    info!(
        "Workflow starting: session={}, slots={:?}",
        session_id,
        slots.iter().map(|s| s.slot_id).collect::<Vec<_>>()
    );

    send_event(
        &tx,
        "session.start",
        &SessionStartEvent {
            session_id: session_id.clone(),
            slots: slots.clone(),
        },
    );
    ctx.events.begin_session(&session_id);

    let mut state = WorkflowState::new(session, slots, message);

    // Early mood signal for the renderer, raced against turn 1. Sentiment is
    // fast on its model; a miss just means no loading effect.
    let sentiment_task = {
        let ctx = ctx.clone();
        let session_id = session_id.clone();
        let message = state.user_message.clone();
        tokio::spawn(async move {
            if !ctx.events.is_enabled() {
                return;
            }
            if let Some(result) = analyze_sentiment(&ctx.llm, &ctx.config, &message).await {
                ctx.events.user_sentiment(&session_id, result);
            }
        })
    };

    execute_turn1(&ctx, &mut state, &tx).await;

    // Short grace period for the mood signal, then move on without it.
    if tokio::time::timeout(std::time::Duration::from_secs(1), sentiment_task)
        .await
        .is_err()
    {
        warn!("Sentiment task didn't complete in time after turn 1");
    }

    let completed_slots = state.turn1.values().filter(|r| r.success).count();

    if completed_slots > 0 {
        execute_turn2(&ctx, &mut state, &tx).await;
        execute_turn3(&ctx, &mut state, &tx).await;
        execute_summary(&ctx, &mut state, &tx).await;
    } else {
        warn!(
            "Turn 1 produced zero successes for session {}; skipping turns 2-4",
            session_id
        );
    }

    write_manifest(&state);
    ctx.events.session_complete(&session_id);

    let _ = tx.send(QueueItem::Done(DoneEvent {
        session_id: session_id.clone(),
        completed_slots,
        turns: 4,
    }));
    info!(
        "Workflow complete: session={}, completedSlots={}",
        session_id, completed_slots
    );
}

// =============================================================================
// Shared per-slot plumbing
// =============================================================================

/// Seed for the deterministic peer shuffle: a stable function of the session
/// and the commenting slot, so tests can assert exact routing.
fn shuffle_seed(session_id: &str, slot_id: SlotId) -> u64 {
    let mut hasher = DefaultHasher::new();
    session_id.hash(&mut hasher);
    slot_id.hash(&mut hasher);
    hasher.finish()
}

fn submit_wave_job(
    ctx: &WorkflowContext,
    session: &TtsSession,
    turn_index: u8,
    kind: MessageKind,
    slot_id: SlotId,
    agent_id: AgentId,
    voice_profile: &str,
    input_path: std::path::PathBuf,
) {
    let target_slots: Vec<SlotId> = if turn_index == SUMMARY_TURN {
        (1..=6).collect()
    } else {
        vec![slot_id, (slot_id % 6) + 1]
    };
    let job = WaveJob {
        session_id: session.session_id.clone(),
        turn_index,
        kind,
        source_slot_id: slot_id,
        agent_id: agent_id.as_str().to_string(),
        voice_profile: voice_profile.to_string(),
        input_path,
        output_dir: waves_output_dir(session.artifacts_root(), &session.session_id, turn_index),
        output_rel_dir: waves_relative_dir(&session.session_id, turn_index),
        target_slots,
    };
    ctx.waves.submit(job);
}

/// Render TTS for a finished utterance, emit `slot.audio` on success or a
/// `tts_error` on failure, then hand the clip to the wave pool. Returns the
/// artifact-relative clip path when audio exists.
#[allow(clippy::too_many_arguments)]
async fn render_slot_audio(
    ctx: &WorkflowContext,
    session: &TtsSession,
    tx: &EventSender,
    turn_index: u8,
    kind: MessageKind,
    slot_id: SlotId,
    agent_id: AgentId,
    voice_profile: crate::core::tts::VoiceProfileName,
    text: &str,
    comment_target: Option<SlotId>,
) -> Option<String> {
    let profile_name = voice_profile.as_str();
    let abs_path = session.turn_audio_path(
        turn_index,
        slot_id,
        agent_id.as_str(),
        profile_name,
        comment_target,
    );
    let rel_path = session.turn_relative_path(
        turn_index,
        slot_id,
        agent_id.as_str(),
        profile_name,
        comment_target,
    );

    match ctx.tts.render_to_file(text, profile_name, &abs_path).await {
        Ok(()) => {
            send_event(
                tx,
                "slot.audio",
                &SlotAudioEvent {
                    session_id: session.session_id.clone(),
                    turn_index,
                    kind,
                    slot_id,
                    agent_id,
                    voice_profile,
                    audio_format: "wav",
                    audio_path: rel_path.clone(),
                },
            );
            submit_wave_job(
                ctx,
                session,
                turn_index,
                kind,
                slot_id,
                agent_id,
                profile_name,
                abs_path,
            );
            Some(rel_path)
        }
        Err(tts_error) => {
            warn!(
                "Turn {} slot {} ({}) TTS error: {}",
                turn_index, slot_id, agent_id, tts_error
            );
            send_event(
                tx,
                "slot.error",
                &SlotErrorEvent {
                    session_id: session.session_id.clone(),
                    turn_index,
                    kind,
                    slot_id,
                    agent_id,
                    error: ErrorDetail::new(tts_error.kind(), tts_error.to_string()),
                },
            );
            None
        }
    }
}

// =============================================================================
// Turn 1: Respond
// =============================================================================

async fn execute_turn1(ctx: &Arc<WorkflowContext>, state: &mut WorkflowState, tx: &EventSender) {
    let session_id = state.session.session_id.clone();
    send_event(
        tx,
        "turn.start",
        &TurnStartEvent {
            session_id: session_id.clone(),
            turn_index: 1,
        },
    );

    let handles: Vec<_> = state
        .slots
        .iter()
        .map(|&slot| {
            let ctx = ctx.clone();
            let session = state.session.clone();
            let message = state.user_message.clone();
            let tx = tx.clone();
            tokio::spawn(async move { process_turn1_slot(ctx, session, message, slot, tx).await })
        })
        .collect();

    for (handle, &slot) in handles.into_iter().zip(state.slots.iter()) {
        let result = handle.await.unwrap_or_else(|_| Turn1Result {
            slot_id: slot.slot_id,
            agent_id: slot.agent_id,
            text: String::new(),
            voice_profile: crate::core::tts::FALLBACK_PROFILE,
            success: false,
            audio_rel: None,
        });
        state.turn1.insert(result.slot_id, result);
    }

    let successful: Vec<SlotId> = state
        .turn1
        .values()
        .filter(|r| r.success)
        .map(|r| r.slot_id)
        .collect();

    send_event(
        tx,
        "turn.done",
        &TurnDoneEvent {
            session_id: session_id.clone(),
            turn_index: 1,
            slot_count: successful.len(),
        },
    );
    ctx.events
        .turn_complete(&session_id, 1, successful.clone(), Vec::new());
    info!(
        "Turn 1 complete: {}/{} slots succeeded",
        successful.len(),
        state.slots.len()
    );
}

async fn process_turn1_slot(
    ctx: Arc<WorkflowContext>,
    session: TtsSession,
    user_message: String,
    slot: SlotAssignment,
    tx: EventSender,
) -> Turn1Result {
    let SlotAssignment { slot_id, agent_id } = slot;
    let session_id = session.session_id.clone();
    let failed = || Turn1Result {
        slot_id,
        agent_id,
        text: String::new(),
        voice_profile: crate::core::tts::FALLBACK_PROFILE,
        success: false,
        audio_rel: None,
    };

    // Client already gone: don't start a generation nobody will see.
    if tx.is_closed() {
        return failed();
    }

    send_event(
        &tx,
        "slot.start",
        &SlotStartEvent {
            session_id: session_id.clone(),
            turn_index: 1,
            kind: MessageKind::Response,
            slot_id,
            agent_id,
        },
    );

    ctx.conversations
        .append_user(slot_id, render_turn1_prompt(&user_message));
    let history = ctx.conversations.history(slot_id);

    let response: SpokenResponse = match ctx.llm.structured(agent_id, &history, &ctx.params()).await
    {
        Ok(response) => response,
        Err(err) => {
            warn!("Turn 1 slot {} ({}) error: {}", slot_id, agent_id, err);
            send_event(
                &tx,
                "slot.error",
                &SlotErrorEvent {
                    session_id,
                    turn_index: 1,
                    kind: MessageKind::Response,
                    slot_id,
                    agent_id,
                    error: ErrorDetail::new(err.kind(), err.to_string()),
                },
            );
            return failed();
        }
    };

    let text = truncate_at_sentence(&response.text, MAX_RESPONSE_CHARS);
    ctx.conversations.append_assistant(slot_id, &text);

    send_event(
        &tx,
        "slot.done",
        &SlotDoneEvent {
            session_id: session_id.clone(),
            turn_index: 1,
            kind: MessageKind::Response,
            slot_id,
            agent_id,
            text: text.clone(),
            voice_profile: response.voice_profile,
            target_slot_id: None,
        },
    );
    info!(
        "Turn 1 slot {} ({}) LLM done: voice={}, text={} chars",
        slot_id,
        agent_id,
        response.voice_profile,
        text.len()
    );

    let audio_rel = render_slot_audio(
        &ctx,
        &session,
        &tx,
        1,
        MessageKind::Response,
        slot_id,
        agent_id,
        response.voice_profile,
        &text,
        None,
    )
    .await;

    Turn1Result {
        slot_id,
        agent_id,
        text,
        voice_profile: response.voice_profile,
        success: true,
        audio_rel,
    }
}

// =============================================================================
// Turn 2: Comment
// =============================================================================

/// Peer pool for one commenting slot: turn-1 successes excluding itself,
/// shuffled deterministically by `(sessionId, slotId)`.
fn build_peer_pool(state: &WorkflowState, exclude_slot_id: SlotId) -> Vec<PeerResponse> {
    let mut peers: Vec<PeerResponse> = state
        .turn1
        .values()
        .filter(|r| r.success && r.slot_id != exclude_slot_id)
        .map(|r| PeerResponse {
            slot_id: r.slot_id,
            agent_id: r.agent_id,
            text: r.text.clone(),
        })
        .collect();
    let mut rng =
        rand::rngs::StdRng::seed_from_u64(shuffle_seed(&state.session.session_id, exclude_slot_id));
    peers.shuffle(&mut rng);
    peers
}

async fn execute_turn2(ctx: &Arc<WorkflowContext>, state: &mut WorkflowState, tx: &EventSender) {
    let session_id = state.session.session_id.clone();
    let eligible: Vec<SlotAssignment> = state
        .slots
        .iter()
        .filter(|s| state.turn1_succeeded(s.slot_id))
        .copied()
        .collect();

    send_event(
        tx,
        "turn.start",
        &TurnStartEvent {
            session_id: session_id.clone(),
            turn_index: 2,
        },
    );

    let handles: Vec<_> = eligible
        .iter()
        .map(|&slot| {
            let ctx = ctx.clone();
            let session = state.session.clone();
            let peers = build_peer_pool(state, slot.slot_id);
            let tx = tx.clone();
            tokio::spawn(async move { process_turn2_slot(ctx, session, slot, peers, tx).await })
        })
        .collect();

    for (handle, &slot) in handles.into_iter().zip(eligible.iter()) {
        let result = handle.await.unwrap_or_else(|_| Turn2Result {
            slot_id: slot.slot_id,
            agent_id: slot.agent_id,
            target_slot_id: 0,
            comment: String::new(),
            voice_profile: crate::core::tts::FALLBACK_PROFILE,
            success: false,
            audio_rel: None,
        });
        state.turn2.insert(result.slot_id, result);
    }

    route_comments(state);

    let successful: Vec<SlotId> = state
        .turn2
        .values()
        .filter(|r| r.success)
        .map(|r| r.slot_id)
        .collect();

    send_event(
        tx,
        "turn.done",
        &TurnDoneEvent {
            session_id: session_id.clone(),
            turn_index: 2,
            slot_count: successful.len(),
        },
    );
    ctx.events
        .turn_complete(&session_id, 2, successful.clone(), Vec::new());
    info!(
        "Turn 2 complete: {}/{} slots succeeded",
        successful.len(),
        eligible.len()
    );
}

async fn process_turn2_slot(
    ctx: Arc<WorkflowContext>,
    session: TtsSession,
    slot: SlotAssignment,
    peers: Vec<PeerResponse>,
    tx: EventSender,
) -> Turn2Result {
    let SlotAssignment { slot_id, agent_id } = slot;
    let session_id = session.session_id.clone();
    let failed = || Turn2Result {
        slot_id,
        agent_id,
        target_slot_id: 0,
        comment: String::new(),
        voice_profile: crate::core::tts::FALLBACK_PROFILE,
        success: false,
        audio_rel: None,
    };

    if tx.is_closed() || peers.is_empty() {
        return failed();
    }

    send_event(
        &tx,
        "slot.start",
        &SlotStartEvent {
            session_id: session_id.clone(),
            turn_index: 2,
            kind: MessageKind::Comment,
            slot_id,
            agent_id,
        },
    );

    ctx.conversations
        .append_user(slot_id, render_turn2_prompt(slot_id, &peers));

    let valid_slots: Vec<SlotId> = peers.iter().map(|p| p.slot_id).collect();
    let mut selection: CommentSelection = match ctx
        .llm
        .structured(agent_id, &ctx.conversations.history(slot_id), &ctx.params())
        .await
    {
        Ok(selection) => selection,
        Err(err) => {
            warn!("Turn 2 slot {} ({}) error: {}", slot_id, agent_id, err);
            send_event(
                &tx,
                "slot.error",
                &SlotErrorEvent {
                    session_id,
                    turn_index: 2,
                    kind: MessageKind::Comment,
                    slot_id,
                    agent_id,
                    error: ErrorDetail::new(err.kind(), err.to_string()),
                },
            );
            return failed();
        }
    };

    // Invalid target: one corrective retry, then a deterministic fallback to
    // the first peer of the shuffled pool.
    if !valid_slots.contains(&selection.target_slot_id) {
        warn!(
            "Turn 2 slot {} chose invalid target {}, retrying",
            slot_id, selection.target_slot_id
        );
        ctx.conversations.append_user(
            slot_id,
            render_turn2_retry_prompt(selection.target_slot_id, &valid_slots),
        );
        match ctx
            .llm
            .structured::<CommentSelection>(agent_id, &ctx.conversations.history(slot_id), &ctx.params())
            .await
        {
            Ok(retry) => selection = retry,
            Err(err) => {
                warn!("Turn 2 slot {} retry failed: {}", slot_id, err);
            }
        }
        if !valid_slots.contains(&selection.target_slot_id) {
            selection.target_slot_id = peers[0].slot_id;
            warn!(
                "Turn 2 slot {} still invalid, falling back to slot {}",
                slot_id, selection.target_slot_id
            );
        }
    }

    let comment = truncate_at_sentence(&selection.comment, MAX_COMMENT_CHARS);
    ctx.conversations.append_assistant(slot_id, &comment);

    send_event(
        &tx,
        "slot.done",
        &SlotDoneEvent {
            session_id: session_id.clone(),
            turn_index: 2,
            kind: MessageKind::Comment,
            slot_id,
            agent_id,
            text: comment.clone(),
            voice_profile: selection.voice_profile,
            target_slot_id: Some(selection.target_slot_id),
        },
    );
    info!(
        "Turn 2 slot {} ({}) LLM done: target={}, voice={}",
        slot_id, agent_id, selection.target_slot_id, selection.voice_profile
    );

    let audio_rel = render_slot_audio(
        &ctx,
        &session,
        &tx,
        2,
        MessageKind::Comment,
        slot_id,
        agent_id,
        selection.voice_profile,
        &comment,
        Some(selection.target_slot_id),
    )
    .await;

    Turn2Result {
        slot_id,
        agent_id,
        target_slot_id: selection.target_slot_id,
        comment,
        voice_profile: selection.voice_profile,
        success: true,
        audio_rel,
    }
}

/// Group turn-2 comments by target and cap each target's incoming list at
/// [`MAX_COMMENTS_PER_TARGET`], keeping the first three by ascending source
/// slot. Discarded comments keep their audio; they just don't reach the
/// reply prompt.
fn route_comments(state: &mut WorkflowState) {
    let mut by_target: BTreeMap<SlotId, Vec<ReceivedComment>> = BTreeMap::new();
    for result in state.turn2.values().filter(|r| r.success) {
        by_target
            .entry(result.target_slot_id)
            .or_default()
            .push(ReceivedComment {
                from_slot_id: result.slot_id,
                from_agent_id: result.agent_id,
                comment: result.comment.clone(),
            });
    }

    for (target, comments) in by_target.iter_mut() {
        comments.sort_by_key(|c| c.from_slot_id);
        if comments.len() > MAX_COMMENTS_PER_TARGET {
            info!(
                "Slot {} received {} comments, capped to {}",
                target,
                comments.len(),
                MAX_COMMENTS_PER_TARGET
            );
            comments.truncate(MAX_COMMENTS_PER_TARGET);
        }
    }

    state.comments_by_target = by_target;
}

// =============================================================================
// Turn 3: Reply
// =============================================================================

async fn execute_turn3(ctx: &Arc<WorkflowContext>, state: &mut WorkflowState, tx: &EventSender) {
    let session_id = state.session.session_id.clone();

    let participants: Vec<(SlotAssignment, Vec<ReceivedComment>, String)> = state
        .slots
        .iter()
        .filter_map(|&slot| {
            let comments = state.comments_by_target.get(&slot.slot_id)?;
            if comments.is_empty() || !state.turn1_succeeded(slot.slot_id) {
                return None;
            }
            let original = state.turn1.get(&slot.slot_id)?.text.clone();
            Some((slot, comments.clone(), original))
        })
        .collect();

    send_event(
        tx,
        "turn.start",
        &TurnStartEvent {
            session_id: session_id.clone(),
            turn_index: 3,
        },
    );

    let handles: Vec<_> = participants
        .iter()
        .map(|(slot, comments, original)| {
            let ctx = ctx.clone();
            let session = state.session.clone();
            let slot = *slot;
            let comments = comments.clone();
            let original = original.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                process_turn3_slot(ctx, session, slot, original, comments, tx).await
            })
        })
        .collect();

    for (handle, (slot, _, _)) in handles.into_iter().zip(participants.iter()) {
        let result = handle.await.unwrap_or_else(|_| Turn3Result {
            slot_id: slot.slot_id,
            agent_id: slot.agent_id,
            text: String::new(),
            voice_profile: crate::core::tts::FALLBACK_PROFILE,
            success: false,
            audio_rel: None,
        });
        state.turn3.insert(result.slot_id, result);
    }

    let successful: Vec<SlotId> = state
        .turn3
        .values()
        .filter(|r| r.success)
        .map(|r| r.slot_id)
        .collect();

    send_event(
        tx,
        "turn.done",
        &TurnDoneEvent {
            session_id: session_id.clone(),
            turn_index: 3,
            slot_count: successful.len(),
        },
    );
    ctx.events
        .turn_complete(&session_id, 3, successful, compute_dialogues(state));
    info!(
        "Turn 3 complete: {} replies from {} targets",
        state.turn3.values().filter(|r| r.success).count(),
        participants.len()
    );
}

async fn process_turn3_slot(
    ctx: Arc<WorkflowContext>,
    session: TtsSession,
    slot: SlotAssignment,
    original_response: String,
    received: Vec<ReceivedComment>,
    tx: EventSender,
) -> Turn3Result {
    let SlotAssignment { slot_id, agent_id } = slot;
    let session_id = session.session_id.clone();
    let failed = || Turn3Result {
        slot_id,
        agent_id,
        text: String::new(),
        voice_profile: crate::core::tts::FALLBACK_PROFILE,
        success: false,
        audio_rel: None,
    };

    if tx.is_closed() {
        return failed();
    }

    send_event(
        &tx,
        "slot.start",
        &SlotStartEvent {
            session_id: session_id.clone(),
            turn_index: 3,
            kind: MessageKind::Reply,
            slot_id,
            agent_id,
        },
    );

    ctx.conversations.append_user(
        slot_id,
        render_turn3_prompt(slot_id, &original_response, &received),
    );

    let response: SpokenResponse = match ctx
        .llm
        .structured(agent_id, &ctx.conversations.history(slot_id), &ctx.params())
        .await
    {
        Ok(response) => response,
        Err(err) => {
            warn!("Turn 3 slot {} ({}) error: {}", slot_id, agent_id, err);
            send_event(
                &tx,
                "slot.error",
                &SlotErrorEvent {
                    session_id,
                    turn_index: 3,
                    kind: MessageKind::Reply,
                    slot_id,
                    agent_id,
                    error: ErrorDetail::new(err.kind(), err.to_string()),
                },
            );
            return failed();
        }
    };

    let text = truncate_at_sentence(&response.text, MAX_RESPONSE_CHARS);
    ctx.conversations.append_assistant(slot_id, &text);

    send_event(
        &tx,
        "slot.done",
        &SlotDoneEvent {
            session_id: session_id.clone(),
            turn_index: 3,
            kind: MessageKind::Reply,
            slot_id,
            agent_id,
            text: text.clone(),
            voice_profile: response.voice_profile,
            target_slot_id: None,
        },
    );

    let audio_rel = render_slot_audio(
        &ctx,
        &session,
        &tx,
        3,
        MessageKind::Reply,
        slot_id,
        agent_id,
        response.voice_profile,
        &text,
        None,
    )
    .await;

    Turn3Result {
        slot_id,
        agent_id,
        text,
        voice_profile: response.voice_profile,
        success: true,
        audio_rel,
    }
}

/// Derive the dialogue specs (commenters + respondent per target) consumed
/// by the event orchestrator, sorted by target slot.
fn compute_dialogues(state: &WorkflowState) -> Vec<DialogueSpec> {
    state
        .turn3
        .values()
        .filter(|reply| reply.success)
        .filter_map(|reply| {
            let comments = state.comments_by_target.get(&reply.slot_id)?;
            if comments.is_empty() {
                return None;
            }
            Some(DialogueSpec {
                dialogue_id: format!("turn23-slot{}", reply.slot_id),
                target_slot_id: reply.slot_id,
                commenter_slots: comments.iter().map(|c| c.from_slot_id).collect(),
                respondent_slot: reply.slot_id,
            })
        })
        .collect()
}

// =============================================================================
// Turn 4: Summary
// =============================================================================

/// Every successful utterance from turns 1-3, in temporal order.
fn collect_all_responses(state: &WorkflowState) -> Vec<DialogueLine> {
    let mut lines = Vec::new();
    for result in state.turn1.values().filter(|r| r.success) {
        lines.push(DialogueLine {
            slot_id: result.slot_id,
            turn_label: "Turn 1 reflection",
            text: result.text.clone(),
        });
    }
    for result in state.turn2.values().filter(|r| r.success) {
        lines.push(DialogueLine {
            slot_id: result.slot_id,
            turn_label: "Turn 2 comment",
            text: result.comment.clone(),
        });
    }
    for result in state.turn3.values().filter(|r| r.success) {
        lines.push(DialogueLine {
            slot_id: result.slot_id,
            turn_label: "Turn 3 reply",
            text: result.text.clone(),
        });
    }
    lines
}

async fn execute_summary(ctx: &Arc<WorkflowContext>, state: &mut WorkflowState, tx: &EventSender) {
    let session_id = state.session.session_id.clone();

    // The summariser is the first slot that survived turn 1, by ascending id.
    let Some(chosen) = state.turn1.values().find(|r| r.success) else {
        return;
    };
    let (slot_id, agent_id) = (chosen.slot_id, chosen.agent_id);

    send_event(
        tx,
        "turn.start",
        &TurnStartEvent {
            session_id: session_id.clone(),
            turn_index: 4,
        },
    );
    send_event(
        tx,
        "summary.start",
        &SummaryStartEvent {
            session_id: session_id.clone(),
            turn_index: 4,
            slot_id,
            agent_id,
        },
    );

    let lines = collect_all_responses(state);
    // Fresh context: the summary never touches a slot conversation.
    let messages = vec![
        ChatMessage::system(&ctx.config.default_system_prompt),
        ChatMessage::user(render_turn4_prompt(&state.user_message, &lines)),
    ];
    let params = GenerationParams {
        temperature: ctx.config.summary_temperature,
        max_tokens: SUMMARY_MAX_TOKENS,
    };

    let response: SpokenResponse = match ctx.llm.structured(agent_id, &messages, &params).await {
        Ok(response) => response,
        Err(err) => {
            warn!("Summary generation error for session {}: {}", session_id, err);
            return;
        }
    };

    let text = truncate_at_sentence(&response.text, MAX_SUMMARY_CHARS);
    send_event(
        tx,
        "summary.done",
        &SummaryDoneEvent {
            session_id: session_id.clone(),
            slot_id,
            agent_id,
            text: text.clone(),
            voice_profile: response.voice_profile,
        },
    );
    info!(
        "Summary LLM done: voice={}, text={} chars",
        response.voice_profile,
        text.len()
    );

    let profile_name = response.voice_profile.as_str();
    let abs_path = state.session.summary_audio_path(agent_id.as_str(), profile_name);
    let rel_path = state
        .session
        .summary_relative_path(agent_id.as_str(), profile_name);

    let audio_rel = match ctx.tts.render_to_file(&text, profile_name, &abs_path).await {
        Ok(()) => {
            send_event(
                tx,
                "summary.audio",
                &SummaryAudioEvent {
                    session_id: session_id.clone(),
                    slot_id,
                    agent_id,
                    voice_profile: response.voice_profile,
                    audio_format: "wav",
                    audio_path: rel_path.clone(),
                },
            );
            // One job fans the summary out to all six speaker bands.
            submit_wave_job(
                ctx,
                &state.session,
                SUMMARY_TURN,
                MessageKind::Summary,
                slot_id,
                agent_id,
                profile_name,
                abs_path,
            );
            send_event(
                tx,
                "turn.done",
                &TurnDoneEvent {
                    session_id: session_id.clone(),
                    turn_index: 4,
                    slot_count: 1,
                },
            );
            Some(rel_path)
        }
        Err(tts_error) => {
            warn!("Summary TTS error for session {}: {}", session_id, tts_error);
            None
        }
    };

    ctx.events
        .summary_complete(&session_id, &text, profile_name);

    state.summary = Some(SummaryResult {
        slot_id,
        agent_id,
        text,
        voice_profile: response.voice_profile,
        success: audio_rel.is_some(),
        audio_rel,
    });
}

// =============================================================================
// Manifest
// =============================================================================

fn write_manifest(state: &WorkflowState) {
    let manifest = SessionManifest {
        session_id: state.session.session_id.clone(),
        created_at: chrono::Utc::now().to_rfc3339(),
        slots: state
            .slots
            .iter()
            .map(|s| ManifestSlot {
                slot_id: s.slot_id,
                agent_id: s.agent_id.as_str().to_string(),
            })
            .collect(),
        turn1: state
            .turn1
            .values()
            .filter(|r| r.success)
            .map(|r| ManifestEntry {
                slot_id: r.slot_id,
                agent_id: r.agent_id.as_str().to_string(),
                voice_profile: r.voice_profile.as_str().to_string(),
                text: r.text.clone(),
                audio_path: r.audio_rel.clone(),
                target_slot_id: None,
                received_comments: Vec::new(),
            })
            .collect(),
        turn2: state
            .turn2
            .values()
            .filter(|r| r.success)
            .map(|r| ManifestEntry {
                slot_id: r.slot_id,
                agent_id: r.agent_id.as_str().to_string(),
                voice_profile: r.voice_profile.as_str().to_string(),
                text: r.comment.clone(),
                audio_path: r.audio_rel.clone(),
                target_slot_id: Some(r.target_slot_id),
                received_comments: Vec::new(),
            })
            .collect(),
        turn3: state
            .turn3
            .values()
            .filter(|r| r.success)
            .map(|r| ManifestEntry {
                slot_id: r.slot_id,
                agent_id: r.agent_id.as_str().to_string(),
                voice_profile: r.voice_profile.as_str().to_string(),
                text: r.text.clone(),
                audio_path: r.audio_rel.clone(),
                target_slot_id: None,
                received_comments: state
                    .comments_by_target
                    .get(&r.slot_id)
                    .map(|comments| {
                        comments
                            .iter()
                            .map(|c| ManifestComment {
                                from_slot_id: c.from_slot_id,
                                from_agent_id: c.from_agent_id.as_str().to_string(),
                                comment: c.comment.clone(),
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
            })
            .collect(),
        summary: state.summary.as_ref().map(|s| ManifestSummary {
            agent_id: s.agent_id.as_str().to_string(),
            voice_profile: s.voice_profile.as_str().to_string(),
            text: s.text.clone(),
            audio_path: s.audio_rel.clone(),
        }),
    };
    state.session.write_manifest(&manifest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sessions::TtsSession;
    use crate::core::tts::VoiceProfileName;
    use tempfile::tempdir;

    fn state_with_turn1(successes: &[SlotId]) -> WorkflowState {
        let dir = tempdir().unwrap();
        let session = TtsSession::with_id(dir.path(), "seed-session".to_string()).unwrap();
        // Leak the tempdir so the session directory survives the test body.
        std::mem::forget(dir);
        let slots: Vec<SlotAssignment> = (1..=6)
            .map(|slot_id| SlotAssignment {
                slot_id,
                agent_id: AgentId::Gpt4o,
            })
            .collect();
        let mut state = WorkflowState::new(session, slots, "hello".to_string());
        for slot_id in 1..=6u8 {
            state.turn1.insert(
                slot_id,
                Turn1Result {
                    slot_id,
                    agent_id: AgentId::Gpt4o,
                    text: format!("reflection {slot_id}"),
                    voice_profile: VoiceProfileName::CalmSoothing,
                    success: successes.contains(&slot_id),
                    audio_rel: None,
                },
            );
        }
        state
    }

    fn comment(from: SlotId, target: SlotId) -> Turn2Result {
        Turn2Result {
            slot_id: from,
            agent_id: AgentId::Gpt4o,
            target_slot_id: target,
            comment: format!("comment from {from}"),
            voice_profile: VoiceProfileName::CalmSoothing,
            success: true,
            audio_rel: None,
        }
    }

    #[test]
    fn test_peer_pool_excludes_self_and_failures() {
        let state = state_with_turn1(&[1, 2, 4, 5]);
        let peers = build_peer_pool(&state, 2);
        let mut ids: Vec<SlotId> = peers.iter().map(|p| p.slot_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 4, 5]);
    }

    #[test]
    fn test_peer_pool_shuffle_is_deterministic() {
        let state = state_with_turn1(&[1, 2, 3, 4, 5, 6]);
        let first: Vec<SlotId> = build_peer_pool(&state, 1).iter().map(|p| p.slot_id).collect();
        let second: Vec<SlotId> = build_peer_pool(&state, 1).iter().map(|p| p.slot_id).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_route_comments_caps_at_three_lowest_slots() {
        let mut state = state_with_turn1(&[1, 2, 3, 4, 5, 6]);
        for from in [1, 3, 4, 5, 6] {
            state.turn2.insert(from, comment(from, 2));
        }
        route_comments(&mut state);

        let received = &state.comments_by_target[&2];
        assert_eq!(received.len(), MAX_COMMENTS_PER_TARGET);
        let froms: Vec<SlotId> = received.iter().map(|c| c.from_slot_id).collect();
        assert_eq!(froms, vec![1, 3, 4]);
    }

    #[test]
    fn test_route_comments_ignores_failures() {
        let mut state = state_with_turn1(&[1, 2, 3]);
        state.turn2.insert(1, comment(1, 3));
        let mut failed = comment(2, 3);
        failed.success = false;
        state.turn2.insert(2, failed);
        route_comments(&mut state);

        assert_eq!(state.comments_by_target[&3].len(), 1);
        assert_eq!(state.comments_by_target[&3][0].from_slot_id, 1);
    }

    #[test]
    fn test_compute_dialogues_requires_successful_reply() {
        let mut state = state_with_turn1(&[1, 2, 3]);
        state.turn2.insert(1, comment(1, 2));
        state.turn2.insert(3, comment(3, 2));
        route_comments(&mut state);

        state.turn3.insert(
            2,
            Turn3Result {
                slot_id: 2,
                agent_id: AgentId::Gpt4o,
                text: "reply".to_string(),
                voice_profile: VoiceProfileName::CalmSoothing,
                success: true,
                audio_rel: None,
            },
        );

        let dialogues = compute_dialogues(&state);
        assert_eq!(dialogues.len(), 1);
        assert_eq!(dialogues[0].dialogue_id, "turn23-slot2");
        assert_eq!(dialogues[0].target_slot_id, 2);
        assert_eq!(dialogues[0].commenter_slots, vec![1, 3]);
        assert_eq!(dialogues[0].respondent_slot, 2);
    }

    #[test]
    fn test_summary_agent_is_first_successful_slot() {
        let state = state_with_turn1(&[3, 5]);
        let chosen = state.turn1.values().find(|r| r.success).unwrap();
        assert_eq!(chosen.slot_id, 3);
    }

    #[test]
    fn test_shuffle_seed_varies_by_slot_and_session() {
        assert_ne!(shuffle_seed("sid", 1), shuffle_seed("sid", 2));
        assert_ne!(shuffle_seed("sid-a", 1), shuffle_seed("sid-b", 1));
        assert_eq!(shuffle_seed("sid", 1), shuffle_seed("sid", 1));
    }
}
