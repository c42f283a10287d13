use image::DynamicImage;
use serde_json::{json, Value};

use retell_contracts::events::SessionLog;
use retell_contracts::feedback::Feedback;
use retell_contracts::history::{HistoryEntry, ScoreHistoryStore};
use retell_contracts::modes::CoachMode;

use crate::capture::{capture_inline_payload, InlinePayload};
use crate::error::CoachError;
use crate::model::CoachModel;

pub const EMPTY_EXPLANATION_MESSAGE: &str = "Please provide an explanation before submitting.";
pub const STRATEGY_FAILED_MESSAGE: &str = "Could not fetch a strategy. Please try again.";
pub const RUN_IN_FLIGHT_MESSAGE: &str = "A submission is already in progress.";

/// Run lifecycle. `Done` and `Error` are terminal for a run; a new submit
/// restarts from `CapturingContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    CapturingContext,
    GeneratingCaption,
    GeneratingFeedback,
    Done,
    Error,
}

impl RunState {
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            RunState::CapturingContext | RunState::GeneratingCaption | RunState::GeneratingFeedback
        )
    }

    pub fn accepts_submit(&self) -> bool {
        !self.is_in_flight()
    }
}

/// One submission's inputs. Built fresh per submission, immutable once
/// built, owned by the pipeline for the duration of the run.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub payload: InlinePayload,
    pub explanation: String,
    pub mode: CoachMode,
    pub strategy_hint: Option<String>,
}

/// Sequences capture, caption, and feedback for one run at a time. The
/// pipeline is the only owner of the in-flight request and the latest
/// result; presentation layers read state but never mutate it.
pub struct CoachPipeline {
    model: Box<dyn CoachModel>,
    history: ScoreHistoryStore,
    log: Option<SessionLog>,
    state: RunState,
    feedback: Option<Feedback>,
    last_error: Option<String>,
    strategy_hint: Option<String>,
}

impl CoachPipeline {
    pub fn new(model: Box<dyn CoachModel>, history: ScoreHistoryStore) -> Self {
        Self {
            model,
            history,
            log: None,
            state: RunState::Idle,
            feedback: None,
            last_error: None,
            strategy_hint: None,
        }
    }

    pub fn with_log(mut self, log: SessionLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn feedback(&self) -> Option<&Feedback> {
        self.feedback.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn strategy_hint(&self) -> Option<&str> {
        self.strategy_hint.as_deref()
    }

    pub fn history(&self) -> &ScoreHistoryStore {
        &self.history
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Back to `Idle`, dropping the latest result, error, and hint. Used
    /// when the displayed image changes.
    pub fn reset(&mut self) {
        self.state = RunState::Idle;
        self.feedback = None;
        self.last_error = None;
        self.strategy_hint = None;
    }

    /// Fetches a strategy hint for the current image. Never moves the run
    /// state; the hint is held and threaded into the next grading call.
    pub fn request_strategy(
        &mut self,
        image: Option<&DynamicImage>,
    ) -> Result<&str, CoachError> {
        let payload = capture_inline_payload(image).map_err(|err| {
            self.last_error = Some(STRATEGY_FAILED_MESSAGE.to_string());
            err
        })?;
        match self.model.generate_strategy(&payload) {
            Ok(hint) => {
                self.emit("strategy_generated", json!({ "chars": hint.len() }));
                self.last_error = None;
                Ok(self.strategy_hint.insert(hint))
            }
            Err(err) => {
                self.last_error = Some(STRATEGY_FAILED_MESSAGE.to_string());
                Err(err)
            }
        }
    }

    /// Runs one full session: capture, caption, then feedback, strictly in
    /// that order. The caption call always completes before the feedback
    /// call begins; at most one run is in flight.
    pub fn submit(
        &mut self,
        image: Option<&DynamicImage>,
        explanation: &str,
        mode: CoachMode,
    ) -> Result<&Feedback, CoachError> {
        if !self.state.accepts_submit() {
            return Err(CoachError::Validation(RUN_IN_FLIGHT_MESSAGE.to_string()));
        }
        if explanation.trim().is_empty() {
            self.last_error = Some(EMPTY_EXPLANATION_MESSAGE.to_string());
            return Err(CoachError::Validation(EMPTY_EXPLANATION_MESSAGE.to_string()));
        }

        self.feedback = None;
        self.last_error = None;

        self.state = RunState::CapturingContext;
        self.emit(
            "session_started",
            json!({ "mode": mode.as_str(), "model": self.model.name() }),
        );
        let payload = match capture_inline_payload(image) {
            Ok(payload) => payload,
            Err(err) => return Err(self.fail(err)),
        };
        let request = SessionRequest {
            payload,
            explanation: explanation.to_string(),
            mode,
            strategy_hint: self.strategy_hint.clone(),
        };
        self.emit(
            "context_captured",
            json!({ "mime_type": request.payload.mime_type }),
        );

        self.state = RunState::GeneratingCaption;
        let caption = match self.model.generate_caption(&request.payload) {
            Ok(caption) => caption,
            Err(err) => return Err(self.fail(err)),
        };
        self.emit("caption_generated", json!({ "chars": caption.len() }));

        self.state = RunState::GeneratingFeedback;
        let feedback = match self.model.generate_feedback(
            &caption,
            &request.explanation,
            request.mode,
            request.strategy_hint.as_deref(),
        ) {
            Ok(feedback) => feedback,
            Err(err) => return Err(self.fail(err)),
        };
        self.emit("feedback_generated", json!({ "score": feedback.score }));

        let entry = HistoryEntry::today(feedback.score, request.mode);
        match self.history.append(entry) {
            Ok(()) => self.emit("history_appended", json!({ "len": self.history.len() })),
            // a full run is not discarded over a trend-file write failure
            Err(err) => self.emit("history_append_failed", json!({ "error": err.to_string() })),
        }

        self.state = RunState::Done;
        self.strategy_hint = None;
        Ok(self.feedback.insert(feedback))
    }

    fn fail(&mut self, err: CoachError) -> CoachError {
        self.state = RunState::Error;
        self.last_error = Some(err.to_string());
        self.emit("session_failed", json!({ "error": err.to_string() }));
        err
    }

    fn emit(&self, event_type: &str, payload: Value) {
        if let Some(log) = &self.log {
            let payload = payload.as_object().cloned().unwrap_or_default();
            // event logging never fails a run
            let _ = log.emit(event_type, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use image::DynamicImage;
    use serde_json::Value;

    use retell_contracts::events::SessionLog;
    use retell_contracts::feedback::{CommunicationBehavior, ExampleRewrite, Feedback};
    use retell_contracts::history::ScoreHistoryStore;
    use retell_contracts::modes::CoachMode;

    use super::{CoachPipeline, RunState, EMPTY_EXPLANATION_MESSAGE};
    use crate::capture::InlinePayload;
    use crate::error::CoachError;
    use crate::model::CoachModel;

    fn sample_feedback(score: u8) -> Feedback {
        Feedback {
            score,
            what_you_did_well: "Clear framing.".to_string(),
            areas_for_improvement: "Weak verbs.".to_string(),
            personalized_tip: "Lead with the subject.".to_string(),
            spoken_response: "Good effort.".to_string(),
            communication_behavior: CommunicationBehavior {
                profile: "Confident Narrator".to_string(),
                strength: "Vivid imagery.".to_string(),
                growth_area: "Hedging language.".to_string(),
            },
            example_rewrite: ExampleRewrite {
                original: "There is a desk.".to_string(),
                improved: "A cluttered desk dominates the frame.".to_string(),
                reasoning: "Specific detail beats an existential opener.".to_string(),
            },
        }
    }

    #[derive(Default)]
    struct Script {
        calls: RefCell<Vec<&'static str>>,
        hints_seen: RefCell<Vec<Option<String>>>,
        fail_caption: Cell<bool>,
        fail_feedback_with_invalid: Cell<bool>,
    }

    struct ScriptedModel {
        script: Rc<Script>,
    }

    impl CoachModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        fn generate_caption(&self, _payload: &InlinePayload) -> Result<String, CoachError> {
            self.script.calls.borrow_mut().push("caption");
            if self.script.fail_caption.get() {
                return Err(CoachError::Generation("caption transport down".to_string()));
            }
            Ok("A person at a desk.".to_string())
        }

        fn generate_strategy(&self, _payload: &InlinePayload) -> Result<String, CoachError> {
            self.script.calls.borrow_mut().push("strategy");
            Ok("Focus on the mood first.".to_string())
        }

        fn generate_feedback(
            &self,
            _caption: &str,
            _explanation: &str,
            _mode: CoachMode,
            strategy_hint: Option<&str>,
        ) -> Result<Feedback, CoachError> {
            self.script.calls.borrow_mut().push("feedback");
            self.script
                .hints_seen
                .borrow_mut()
                .push(strategy_hint.map(str::to_string));
            if self.script.fail_feedback_with_invalid.get() {
                return Err(CoachError::InvalidResponse("missing score".to_string()));
            }
            Ok(sample_feedback(85))
        }
    }

    fn pipeline_with_script(
        dir: &std::path::Path,
    ) -> (CoachPipeline, Rc<Script>) {
        let script = Rc::new(Script::default());
        let model = ScriptedModel {
            script: Rc::clone(&script),
        };
        let history = ScoreHistoryStore::load(dir.join("score_history.json"));
        (CoachPipeline::new(Box::new(model), history), script)
    }

    fn test_image() -> DynamicImage {
        DynamicImage::new_rgb8(2, 2)
    }

    #[test]
    fn empty_explanation_is_rejected_without_any_calls() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut pipeline, script) = pipeline_with_script(temp.path());
        let image = test_image();

        let err = pipeline
            .submit(Some(&image), "   \n", CoachMode::Teacher)
            .err()
            .expect("whitespace explanation must be rejected");

        assert!(err.is_validation());
        assert_eq!(pipeline.state(), RunState::Idle);
        assert_eq!(pipeline.last_error(), Some(EMPTY_EXPLANATION_MESSAGE));
        assert!(script.calls.borrow().is_empty());
        assert!(pipeline.history().is_empty());
        Ok(())
    }

    #[test]
    fn successful_run_reaches_done_and_appends_history() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut pipeline, script) = pipeline_with_script(temp.path());
        let image = test_image();

        let score = pipeline
            .submit(Some(&image), "Someone is working at a desk.", CoachMode::Teacher)
            .map_err(anyhow::Error::new)?
            .score;

        assert_eq!(score, 85);
        assert_eq!(pipeline.state(), RunState::Done);
        assert_eq!(pipeline.last_error(), None);
        assert_eq!(pipeline.history().len(), 1);
        assert_eq!(pipeline.history().entries()[0].score, 85);
        assert_eq!(pipeline.history().entries()[0].mode, CoachMode::Teacher);
        assert_eq!(*script.calls.borrow(), vec!["caption", "feedback"]);
        Ok(())
    }

    #[test]
    fn caption_failure_stops_before_feedback() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut pipeline, script) = pipeline_with_script(temp.path());
        script.fail_caption.set(true);
        let image = test_image();

        let err = pipeline
            .submit(Some(&image), "Someone is working.", CoachMode::Debater)
            .err()
            .expect("caption failure must fail the run");

        assert!(matches!(err, CoachError::Generation(_)));
        assert_eq!(pipeline.state(), RunState::Error);
        assert_eq!(*script.calls.borrow(), vec!["caption"]);
        assert!(pipeline.history().is_empty());
        assert!(pipeline.feedback().is_none());
        Ok(())
    }

    #[test]
    fn capture_failure_moves_to_error_without_network_calls() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut pipeline, script) = pipeline_with_script(temp.path());

        let err = pipeline
            .submit(None, "Someone is working.", CoachMode::Teacher)
            .err()
            .expect("missing image must fail the run");

        assert!(matches!(err, CoachError::Capture(_)));
        assert_eq!(pipeline.state(), RunState::Error);
        assert!(script.calls.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn unusable_feedback_result_reaches_error_state() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut pipeline, script) = pipeline_with_script(temp.path());
        script.fail_feedback_with_invalid.set(true);
        let image = test_image();

        let err = pipeline
            .submit(Some(&image), "Someone is working.", CoachMode::Teacher)
            .err()
            .expect("schema failure must fail the run");

        assert!(matches!(err, CoachError::InvalidResponse(_)));
        assert_eq!(pipeline.state(), RunState::Error);
        assert!(pipeline.history().is_empty());
        Ok(())
    }

    #[test]
    fn resubmit_after_error_restarts_the_run() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut pipeline, script) = pipeline_with_script(temp.path());
        script.fail_caption.set(true);
        let image = test_image();

        assert!(pipeline
            .submit(Some(&image), "Someone is working.", CoachMode::Teacher)
            .is_err());
        assert_eq!(pipeline.state(), RunState::Error);

        script.fail_caption.set(false);
        pipeline
            .submit(Some(&image), "Someone is working.", CoachMode::Teacher)
            .map_err(anyhow::Error::new)?;
        assert_eq!(pipeline.state(), RunState::Done);
        assert_eq!(pipeline.history().len(), 1);
        Ok(())
    }

    #[test]
    fn strategy_hint_is_threaded_into_grading_then_consumed() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut pipeline, script) = pipeline_with_script(temp.path());
        let image = test_image();

        let hint = pipeline
            .request_strategy(Some(&image))
            .map_err(anyhow::Error::new)?
            .to_string();
        assert_eq!(hint, "Focus on the mood first.");
        assert_eq!(pipeline.state(), RunState::Idle);

        pipeline
            .submit(Some(&image), "Someone is working.", CoachMode::Teacher)
            .map_err(anyhow::Error::new)?;
        assert_eq!(pipeline.strategy_hint(), None);

        pipeline
            .submit(Some(&image), "Someone is working.", CoachMode::Teacher)
            .map_err(anyhow::Error::new)?;

        let hints = script.hints_seen.borrow();
        assert_eq!(hints[0].as_deref(), Some("Focus on the mood first."));
        assert_eq!(hints[1], None);
        Ok(())
    }

    #[test]
    fn a_new_result_replaces_the_previous_one() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut pipeline, _script) = pipeline_with_script(temp.path());
        let image = test_image();

        pipeline
            .submit(Some(&image), "First take.", CoachMode::Teacher)
            .map_err(anyhow::Error::new)?;
        pipeline
            .submit(Some(&image), "Second take.", CoachMode::Storyteller)
            .map_err(anyhow::Error::new)?;

        assert_eq!(pipeline.history().len(), 2);
        assert!(pipeline.feedback().is_some());
        assert_eq!(pipeline.state(), RunState::Done);
        Ok(())
    }

    #[test]
    fn reset_returns_to_idle_and_clears_run_data() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let (mut pipeline, _script) = pipeline_with_script(temp.path());
        let image = test_image();

        pipeline
            .submit(Some(&image), "Someone is working.", CoachMode::Teacher)
            .map_err(anyhow::Error::new)?;
        pipeline.reset();

        assert_eq!(pipeline.state(), RunState::Idle);
        assert!(pipeline.feedback().is_none());
        assert!(pipeline.last_error().is_none());
        // history persists across runs, independent of the reset
        assert_eq!(pipeline.history().len(), 1);
        Ok(())
    }

    #[test]
    fn session_events_are_emitted_in_stage_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let (pipeline, _script) = pipeline_with_script(temp.path());
        let mut pipeline = pipeline.with_log(SessionLog::new(&events_path, "session-1"));
        let image = test_image();

        pipeline
            .submit(Some(&image), "Someone is working.", CoachMode::Teacher)
            .map_err(anyhow::Error::new)?;

        let raw = std::fs::read_to_string(events_path)?;
        let types: Vec<String> = raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect();

        let position = |name: &str| {
            types
                .iter()
                .position(|t| t == name)
                .unwrap_or_else(|| panic!("missing {name}"))
        };
        assert!(position("session_started") < position("context_captured"));
        assert!(position("context_captured") < position("caption_generated"));
        assert!(position("caption_generated") < position("feedback_generated"));
        assert!(position("feedback_generated") < position("history_appended"));
        Ok(())
    }

    #[test]
    fn failed_run_emits_session_failed() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let (pipeline, script) = pipeline_with_script(temp.path());
        script.fail_caption.set(true);
        let mut pipeline = pipeline.with_log(SessionLog::new(&events_path, "session-1"));
        let image = test_image();

        assert!(pipeline
            .submit(Some(&image), "Someone is working.", CoachMode::Teacher)
            .is_err());

        let raw = std::fs::read_to_string(events_path)?;
        assert!(raw.contains("\"session_failed\""));
        assert!(!raw.contains("\"feedback_generated\""));
        Ok(())
    }
}
