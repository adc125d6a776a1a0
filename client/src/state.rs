use tracing::{debug, info, warn};

use shared::types::event::PushEvent;
use shared::types::script::{Script, VERSION_SLOTS};

use crate::channel::ChannelEvent;
use crate::identity::unix_millis;

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Lifecycle of one generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Ready,
}

/// One of the concurrent generation jobs announced at dispatch time.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    /// 1-based position, matching the wire's `scriptIndex`.
    pub index: u32,
    /// Opaque per-job token: seeded from the dispatch ack, replaced by the
    /// `readyToken` arriving with the finished script.
    pub token: Option<String>,
    pub status: JobStatus,
    pub script: Option<Script>,
    /// When the script for this job arrived, Unix millis.
    pub received_at_ms: Option<i64>,
}

impl GenerationJob {
    fn pending(index: u32, token: Option<String>) -> Self {
        Self {
            index,
            token,
            status: JobStatus::Pending,
            script: None,
            received_at_ms: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Completed/total reading for the progress bar.
///
/// `completed` mirrors the backend's own view: it is the `scriptIndex` of
/// the latest `script_ready` event, not a count of locally ready jobs. With
/// out-of-order delivery the reading can move backwards; use
/// [`SessionState::ready_count`] for a monotonic count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub completed: u32,
    pub total: u32,
}

impl Progress {
    /// Percentage for display, rounded to the nearest whole number. Zero
    /// while the total is unknown.
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed as f64 / self.total as f64) * 100.0).round() as u32
    }
}

/// Where the session is in its generation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Generating,
    Complete,
}

// ---------------------------------------------------------------------------
// Session state reducer
// ---------------------------------------------------------------------------

/// Aggregated view of one generation exchange.
///
/// A pure reducer over [`ChannelEvent`]s: [`apply`](Self::apply) is the only
/// mutation path once a generation has started, so replaying the same event
/// sequence always produces the same state.
#[derive(Debug, Default)]
pub struct SessionState {
    jobs: Vec<GenerationJob>,
    progress: Progress,
    phase: SessionPhase,
    parse_failures: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear previous results and enter the generating phase. Jobs are
    /// seeded separately once the dispatch ack announces them.
    pub(crate) fn begin_generation(&mut self) {
        self.jobs.clear();
        self.progress = Progress::default();
        self.phase = SessionPhase::Generating;
    }

    /// Seed one pending job per expected script, tokens assigned by
    /// position.
    pub(crate) fn seed_jobs(&mut self, tokens: &[String], total: usize) {
        self.jobs = (1..=total)
            .map(|index| GenerationJob::pending(index as u32, tokens.get(index - 1).cloned()))
            .collect();
        self.progress = Progress {
            completed: 0,
            total: total as u32,
        };
        self.phase = SessionPhase::Generating;
    }

    /// Return to the idle phase after a failed dispatch. Already aggregated
    /// results are kept.
    pub(crate) fn abort_generation(&mut self) {
        self.phase = SessionPhase::Idle;
    }

    /// Fold one channel event into the state.
    pub fn apply(&mut self, event: &ChannelEvent) {
        match event {
            ChannelEvent::Push(push) => self.apply_push(push),
            ChannelEvent::Malformed { error } => {
                self.parse_failures += 1;
                debug!(
                    "malformed event #{} ignored: {}",
                    self.parse_failures, error
                );
            }
        }
    }

    fn apply_push(&mut self, event: &PushEvent) {
        match event {
            PushEvent::Connected { message } => {
                info!(
                    "backend acknowledged the event stream{}",
                    message
                        .as_deref()
                        .map(|m| format!(": {}", m))
                        .unwrap_or_default()
                );
            }
            PushEvent::ScriptReady {
                data,
                ready_token,
                script_index,
                total_scripts,
            } => self.script_ready(data, ready_token.as_deref(), *script_index, *total_scripts),
            PushEvent::AllScriptsComplete { scripts, all_tokens } => {
                self.all_complete(scripts, all_tokens)
            }
            PushEvent::Unknown => {
                debug!("ignoring unrecognised push event type");
            }
        }
    }

    fn script_ready(
        &mut self,
        data: &Script,
        ready_token: Option<&str>,
        script_index: u32,
        total_scripts: u32,
    ) {
        // The wire index is 1-based; zero would underflow the slot position.
        if script_index == 0 {
            warn!("script_ready carried index 0; dropping");
            return;
        }
        let position = (script_index - 1) as usize;
        self.grow_jobs(position + 1);

        let mut script = data.clone();
        script.sort_scenes();

        let job = &mut self.jobs[position];
        job.status = JobStatus::Ready;
        job.script = Some(script);
        job.received_at_ms = Some(unix_millis());
        if let Some(token) = ready_token {
            job.token = Some(token.to_string());
        }

        // Latest-seen progress, as announced by the backend. Keep completed
        // within total even if the backend disagrees with itself.
        self.progress.completed = script_index;
        self.progress.total = total_scripts.max(script_index);

        info!(
            "script {}/{} ready: {}",
            script_index, self.progress.total, data.title
        );
    }

    fn all_complete(&mut self, scripts: &[Script], all_tokens: &[String]) {
        self.grow_jobs(scripts.len());

        // Final authority: overwrite by position whatever arrived per-script.
        for (position, incoming) in scripts.iter().enumerate() {
            let mut script = incoming.clone();
            script.sort_scenes();

            let job = &mut self.jobs[position];
            job.status = JobStatus::Ready;
            job.script = Some(script);
            job.received_at_ms = Some(unix_millis());
            if let Some(token) = all_tokens.get(position) {
                job.token = Some(token.clone());
            }
        }

        self.progress = Progress {
            completed: scripts.len() as u32,
            total: scripts.len() as u32,
        };
        self.phase = SessionPhase::Complete;

        info!("all {} scripts complete", scripts.len());
    }

    /// Jobs are never removed within a session; an index beyond the
    /// announced set appends pending placeholders up to it.
    fn grow_jobs(&mut self, len: usize) {
        while self.jobs.len() < len {
            let index = self.jobs.len() as u32 + 1;
            self.jobs.push(GenerationJob::pending(index, None));
        }
    }

    // -- accessors ----------------------------------------------------------

    pub fn jobs(&self) -> &[GenerationJob] {
        &self.jobs
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == SessionPhase::Complete
    }

    /// Number of jobs whose script has arrived. Monotonic within one
    /// generation, unlike [`progress`](Self::progress).
    pub fn ready_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|job| job.status == JobStatus::Ready)
            .count()
    }

    /// Events whose payload failed to decode since the session started.
    pub fn parse_failures(&self) -> u64 {
        self.parse_failures
    }

    /// Project the jobs onto the three fixed version slots.
    pub fn versions(&self) -> [VersionSlot; VERSION_SLOTS] {
        std::array::from_fn(|position| {
            let label = (b'A' + position as u8) as char;
            match self.jobs.get(position).and_then(|job| job.script.clone()) {
                Some(script) => VersionSlot {
                    label,
                    script,
                    generated: true,
                },
                None => VersionSlot {
                    label,
                    script: Script::placeholder(),
                    generated: false,
                },
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Version slots
// ---------------------------------------------------------------------------

/// Fallback teaser shown while a slot has no usable scene text.
const DEFAULT_SUMMARY: &str = "AI-generated mathematical animation";

/// Read model for one of the three version slots offered to the user.
#[derive(Debug, Clone)]
pub struct VersionSlot {
    /// `'A'`, `'B'` or `'C'`.
    pub label: char,
    /// Latest known script, or the blank placeholder when none arrived.
    pub script: Script,
    /// Whether `script` is generated content rather than the placeholder.
    pub generated: bool,
}

impl VersionSlot {
    /// Card title in the selection grid.
    pub fn style_title(&self) -> String {
        format!("Generated Style {}", self.label)
    }

    /// First-scene teaser, truncated to 100 characters.
    pub fn summary(&self) -> String {
        match self.script.first_scene_text() {
            Some(text) if !text.trim().is_empty() => truncate_chars(text, 100),
            _ => DEFAULT_SUMMARY.to_string(),
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::script::Scene;

    fn script(title: &str) -> Script {
        Script {
            title: title.to_string(),
            scenes: vec![Scene {
                seq: 1,
                text: format!("{} opening", title),
                anim: "fade".to_string(),
                duration_sec: 3.0,
            }],
        }
    }

    fn ready(script_index: u32, total: u32, title: &str) -> ChannelEvent {
        ChannelEvent::Push(PushEvent::ScriptReady {
            data: script(title),
            ready_token: Some(format!("tok-{}", script_index)),
            script_index,
            total_scripts: total,
        })
    }

    fn seeded_state() -> SessionState {
        let mut state = SessionState::new();
        state.begin_generation();
        state.seed_jobs(
            &["a".to_string(), "b".to_string(), "c".to_string()],
            3,
        );
        state
    }

    #[test]
    fn seed_jobs_assigns_tokens_by_position() {
        let state = seeded_state();

        assert_eq!(state.jobs().len(), 3);
        assert_eq!(state.phase(), SessionPhase::Generating);
        assert_eq!(state.progress(), Progress { completed: 0, total: 3 });
        assert_eq!(state.jobs()[0].token.as_deref(), Some("a"));
        assert_eq!(state.jobs()[2].token.as_deref(), Some("c"));
        assert!(state.jobs().iter().all(|j| j.status == JobStatus::Pending));
    }

    #[test]
    fn script_ready_fills_the_matching_slot() {
        let mut state = seeded_state();

        state.apply(&ready(2, 3, "Style B"));

        assert_eq!(state.jobs()[1].status, JobStatus::Ready);
        assert_eq!(
            state.jobs()[1].script.as_ref().unwrap().title,
            "Style B"
        );
        assert_eq!(state.jobs()[1].token.as_deref(), Some("tok-2"));
        assert_eq!(state.jobs()[0].status, JobStatus::Pending);
        assert_eq!(state.ready_count(), 1);
    }

    #[test]
    fn progress_tracks_the_latest_announced_index() {
        let mut state = seeded_state();

        state.apply(&ready(3, 3, "Style C"));
        assert_eq!(state.progress(), Progress { completed: 3, total: 3 });

        // Older event arriving late moves the reading backwards on purpose.
        state.apply(&ready(1, 3, "Style A"));
        assert_eq!(state.progress(), Progress { completed: 1, total: 3 });

        // The monotonic count is unaffected.
        assert_eq!(state.ready_count(), 2);
    }

    #[test]
    fn progress_never_exceeds_total() {
        let mut state = seeded_state();

        state.apply(&ready(5, 3, "beyond"));

        let progress = state.progress();
        assert!(progress.completed <= progress.total);
        assert_eq!(progress.completed, 5);
        assert_eq!(state.jobs().len(), 5);
    }

    #[test]
    fn index_zero_is_dropped() {
        let mut state = seeded_state();

        state.apply(&ChannelEvent::Push(PushEvent::ScriptReady {
            data: script("bogus"),
            ready_token: None,
            script_index: 0,
            total_scripts: 3,
        }));

        assert_eq!(state.ready_count(), 0);
        assert_eq!(state.progress(), Progress { completed: 0, total: 3 });
    }

    #[test]
    fn duplicate_index_overwrites_the_slot() {
        let mut state = seeded_state();

        state.apply(&ready(1, 3, "first draft"));
        state.apply(&ready(1, 3, "second draft"));

        assert_eq!(state.ready_count(), 1);
        assert_eq!(
            state.jobs()[0].script.as_ref().unwrap().title,
            "second draft"
        );
    }

    #[test]
    fn scenes_are_sorted_on_ingest() {
        let mut state = seeded_state();

        let out_of_order = Script {
            title: "t".to_string(),
            scenes: vec![
                Scene {
                    seq: 2,
                    text: "b".to_string(),
                    ..Scene::default()
                },
                Scene {
                    seq: 1,
                    text: "a".to_string(),
                    ..Scene::default()
                },
            ],
        };
        state.apply(&ChannelEvent::Push(PushEvent::ScriptReady {
            data: out_of_order,
            ready_token: None,
            script_index: 1,
            total_scripts: 3,
        }));

        let stored = state.jobs()[0].script.as_ref().unwrap();
        assert_eq!(stored.scenes[0].seq, 1);
        assert_eq!(stored.scenes[1].seq, 2);
    }

    #[test]
    fn all_complete_overwrites_by_position_and_finishes() {
        let mut state = seeded_state();

        state.apply(&ready(2, 3, "partial"));
        state.apply(&ChannelEvent::Push(PushEvent::AllScriptsComplete {
            scripts: vec![script("Final A"), script("Final B"), script("Final C")],
            all_tokens: vec!["fa".to_string(), "fb".to_string(), "fc".to_string()],
        }));

        assert!(state.is_complete());
        assert_eq!(state.progress(), Progress { completed: 3, total: 3 });
        assert_eq!(state.ready_count(), 3);

        let titles: Vec<&str> = state
            .jobs()
            .iter()
            .map(|j| j.script.as_ref().unwrap().title.as_str())
            .collect();
        assert_eq!(titles, vec!["Final A", "Final B", "Final C"]);
        assert_eq!(state.jobs()[1].token.as_deref(), Some("fb"));
    }

    #[test]
    fn malformed_events_only_bump_the_counter() {
        let mut state = seeded_state();

        state.apply(&ChannelEvent::Malformed {
            error: "expected value at line 1".to_string(),
        });

        assert_eq!(state.parse_failures(), 1);
        assert_eq!(state.ready_count(), 0);
        assert_eq!(state.phase(), SessionPhase::Generating);
    }

    #[test]
    fn unknown_and_connected_events_change_nothing() {
        let mut state = seeded_state();
        let before = state.progress();

        state.apply(&ChannelEvent::Push(PushEvent::Unknown));
        state.apply(&ChannelEvent::Push(PushEvent::Connected {
            message: Some("ok".to_string()),
        }));

        assert_eq!(state.progress(), before);
        assert_eq!(state.ready_count(), 0);
        assert_eq!(state.parse_failures(), 0);
    }

    #[test]
    fn begin_generation_clears_previous_results() {
        let mut state = seeded_state();
        state.apply(&ready(1, 3, "old run"));

        state.begin_generation();

        assert!(state.jobs().is_empty());
        assert_eq!(state.progress(), Progress::default());
        assert_eq!(state.phase(), SessionPhase::Generating);
    }

    #[test]
    fn versions_fill_missing_slots_with_placeholders() {
        let mut state = seeded_state();
        state.apply(&ready(2, 3, "only B"));

        let [a, b, c] = state.versions();

        assert_eq!(a.label, 'A');
        assert!(!a.generated);
        assert_eq!(a.script.scenes.len(), 2);

        assert_eq!(b.label, 'B');
        assert!(b.generated);
        assert_eq!(b.script.title, "only B");
        assert_eq!(b.style_title(), "Generated Style B");

        assert_eq!(c.label, 'C');
        assert!(!c.generated);
    }

    #[test]
    fn summary_truncates_long_scene_text() {
        let mut slot_script = script("long");
        slot_script.scenes[0].text = "x".repeat(250);
        let slot = VersionSlot {
            label: 'A',
            script: slot_script,
            generated: true,
        };

        let summary = slot.summary();
        assert_eq!(summary.chars().count(), 103);
        assert!(summary.ends_with("..."));
    }

    #[test]
    fn summary_falls_back_when_there_is_no_scene_text() {
        let slot = VersionSlot {
            label: 'A',
            script: Script::placeholder(),
            generated: false,
        };
        assert_eq!(slot.summary(), DEFAULT_SUMMARY);
    }

    #[test]
    fn percent_rounds_to_nearest() {
        assert_eq!(Progress { completed: 0, total: 0 }.percent(), 0);
        assert_eq!(Progress { completed: 1, total: 3 }.percent(), 33);
        assert_eq!(Progress { completed: 2, total: 3 }.percent(), 67);
        assert_eq!(Progress { completed: 3, total: 3 }.percent(), 100);
    }
}
