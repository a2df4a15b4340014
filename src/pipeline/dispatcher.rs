//! Ordered delivery of engine results to the consumer.
//!
//! Emotion outcomes and speech fragments arrive on two independent channels.
//! Emotion results are delivered as soon as they arrive. A speech fragment
//! for batch `j` is held back until the emotion worker has reported on batch
//! `j - 1` (or a later one, or has stopped), so an emotion result is never
//! seen after text from a later batch. The dispatcher also owns the
//! conversation aggregator and drives the advisor, all on one thread.

use crate::advisor::{Advice, AdvisorWorker};
use crate::conversation::ConversationAggregator;
use crate::emotion::{EmotionDistribution, EmotionLabel};
use crate::pipeline::station::POLL_INTERVAL;
use crate::pipeline::types::{EmotionOutcome, SpeechFragment};
use crossbeam_channel::{Receiver, Sender, never, select};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// How many recent per-batch emotion labels are kept for hint lookup.
const RECENT_EMOTIONS: usize = 64;

/// Receives pipeline notifications on the dispatcher thread.
///
/// Callbacks must not block for long: they run inline with result delivery
/// and conversation aggregation, never on an inference thread.
pub trait PipelineObserver: Send {
    fn on_emotion(&mut self, _distribution: &EmotionDistribution, _batch_index: u64) {}

    fn on_speech(&mut self, _text: &str, _emotion_label: &str) {}

    fn on_advice(&mut self, _text: &str) {}
}

/// A notification, as recorded by `CollectingObserver`.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Emotion {
        batch_index: u64,
        distribution: EmotionDistribution,
    },
    Speech {
        text: String,
        emotion: String,
    },
    Advice {
        text: String,
    },
}

/// Observer that records every notification.
#[derive(Debug, Clone, Default)]
pub struct CollectingObserver {
    events: Arc<Mutex<Vec<PipelineEvent>>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the recorded events.
    pub fn events(&self) -> Arc<Mutex<Vec<PipelineEvent>>> {
        self.events.clone()
    }

    fn push(&self, event: PipelineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl PipelineObserver for CollectingObserver {
    fn on_emotion(&mut self, distribution: &EmotionDistribution, batch_index: u64) {
        self.push(PipelineEvent::Emotion {
            batch_index,
            distribution: *distribution,
        });
    }

    fn on_speech(&mut self, text: &str, emotion_label: &str) {
        self.push(PipelineEvent::Speech {
            text: text.to_string(),
            emotion: emotion_label.to_string(),
        });
    }

    fn on_advice(&mut self, text: &str) {
        self.push(PipelineEvent::Advice {
            text: text.to_string(),
        });
    }
}

/// Commands from the control surface, executed on the dispatcher thread.
#[derive(Debug)]
pub enum ControlCommand {
    SetGoal(String),
    ClearGoal,
    /// Manual advice request; the reply says whether it was accepted.
    RequestAdvice(Sender<bool>),
}

/// Merges engine results, feeds the aggregator and triggers the advisor.
pub struct ResultDispatcher {
    observer: Box<dyn PipelineObserver>,
    aggregator: ConversationAggregator,
    advisor: AdvisorWorker,
    /// Highest batch index the emotion worker has reported on.
    emotion_watermark: Option<u64>,
    emotion_finished: bool,
    pending_speech: VecDeque<SpeechFragment>,
    recent_emotions: BTreeMap<u64, EmotionLabel>,
    latest_emotion: Option<EmotionLabel>,
    /// Set once cancellation is observed; no new advisory requests start.
    stopping: bool,
}

impl ResultDispatcher {
    pub fn new(
        observer: Box<dyn PipelineObserver>,
        aggregator: ConversationAggregator,
        advisor: AdvisorWorker,
    ) -> Self {
        Self {
            observer,
            aggregator,
            advisor,
            emotion_watermark: None,
            emotion_finished: false,
            pending_speech: VecDeque::new(),
            recent_emotions: BTreeMap::new(),
            latest_emotion: None,
            stopping: false,
        }
    }

    pub fn aggregator(&self) -> &ConversationAggregator {
        &self.aggregator
    }

    /// Speech fragments waiting for the emotion stream to catch up.
    pub fn pending_speech(&self) -> usize {
        self.pending_speech.len()
    }

    pub fn handle_emotion(&mut self, outcome: EmotionOutcome) {
        let index = outcome.batch_index();
        self.emotion_watermark = Some(self.emotion_watermark.map_or(index, |w| w.max(index)));

        if let EmotionOutcome::Classified(result) = outcome {
            let top = result.distribution.top();
            self.recent_emotions.insert(index, top);
            while self.recent_emotions.len() > RECENT_EMOTIONS {
                self.recent_emotions.pop_first();
            }
            self.latest_emotion = Some(top);
            self.observer.on_emotion(&result.distribution, index);
        }

        self.release_speech();
    }

    pub fn handle_speech(&mut self, fragment: SpeechFragment) {
        self.pending_speech.push_back(fragment);
        self.release_speech();
    }

    /// The emotion stream ended; nothing more will hold speech back.
    pub fn emotion_finished(&mut self) {
        self.emotion_finished = true;
        self.release_speech();
    }

    pub fn handle_advice(&mut self, advice: Advice) {
        self.observer.on_advice(&advice.text);
    }

    pub fn handle_control(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::SetGoal(goal) => {
                self.aggregator.set_goal(goal);
                tracing::info!(goal = ?self.aggregator.state().goal(), "goal updated");
                if self.aggregator.advisory_due() {
                    self.trigger_advice();
                }
            }
            ControlCommand::ClearGoal => {
                self.aggregator.clear_goal();
                tracing::info!("goal cleared");
            }
            ControlCommand::RequestAdvice(reply) => {
                let accepted = self.request_advice();
                if reply.send(accepted).is_err() {
                    tracing::debug!("advice request caller stopped waiting");
                }
            }
        }
    }

    /// Manual trigger. Rejected without a goal or conversation.
    pub fn request_advice(&mut self) -> bool {
        if self.aggregator.state().goal().is_none() {
            tracing::warn!("advice requested without a goal");
            return false;
        }
        if self.aggregator.state().history().is_empty() {
            tracing::warn!("advice requested before any speech was recognized");
            return false;
        }
        self.trigger_advice()
    }

    fn trigger_advice(&mut self) -> bool {
        if self.stopping {
            tracing::debug!("stopping, advisory request not started");
            return false;
        }
        let Some(request) = self.aggregator.advisory_request() else {
            return false;
        };
        let accepted = self.advisor.trigger(request);
        if accepted {
            self.aggregator.mark_triggered();
        }
        accepted
    }

    fn speech_ready(&self, batch_index: u64) -> bool {
        self.emotion_finished
            || batch_index == 0
            || self.emotion_watermark.is_some_and(|w| w + 1 >= batch_index)
    }

    fn release_speech(&mut self) {
        while let Some(front) = self.pending_speech.front() {
            if !self.speech_ready(front.batch_index) {
                break;
            }
            if let Some(fragment) = self.pending_speech.pop_front() {
                self.deliver_speech(fragment);
            }
        }
    }

    fn resolve_emotion(&self, fragment: &SpeechFragment) -> EmotionLabel {
        fragment
            .emotion_hint
            .or_else(|| self.recent_emotions.get(&fragment.batch_index).copied())
            .or(self.latest_emotion)
            .unwrap_or(EmotionLabel::Neutral)
    }

    fn deliver_speech(&mut self, fragment: SpeechFragment) {
        let label = self.resolve_emotion(&fragment);
        self.observer.on_speech(&fragment.text, label.as_str());
        if self.aggregator.record(&fragment.text, label.as_str()) {
            self.trigger_advice();
        }
    }

    /// Dispatcher thread body.
    ///
    /// Runs until both result streams have ended, or until cancellation, in
    /// which case whatever is already queued is delivered and held speech is
    /// released. Advice requests arriving in that final drain are rejected.
    /// Returns the aggregator with the final conversation state.
    pub fn run(
        mut self,
        emotion_rx: Receiver<EmotionOutcome>,
        speech_rx: Receiver<SpeechFragment>,
        control_rx: Receiver<ControlCommand>,
        advice_rx: Receiver<Advice>,
        running: Arc<AtomicBool>,
    ) -> ConversationAggregator {
        let closed_emotion = never();
        let closed_speech = never();
        let closed_control = never();
        let mut emotion_open = true;
        let mut speech_open = true;
        let mut control_open = true;

        while running.load(Ordering::SeqCst) && (emotion_open || speech_open) {
            let emotion = if emotion_open { &emotion_rx } else { &closed_emotion };
            let speech = if speech_open { &speech_rx } else { &closed_speech };
            let control = if control_open { &control_rx } else { &closed_control };

            select! {
                recv(emotion) -> msg => match msg {
                    Ok(outcome) => self.handle_emotion(outcome),
                    Err(_) => {
                        emotion_open = false;
                        self.emotion_finished();
                    }
                },
                recv(speech) -> msg => match msg {
                    Ok(fragment) => self.handle_speech(fragment),
                    Err(_) => speech_open = false,
                },
                recv(control) -> msg => match msg {
                    Ok(command) => self.handle_control(command),
                    Err(_) => control_open = false,
                },
                recv(advice_rx) -> msg => {
                    if let Ok(advice) = msg {
                        self.handle_advice(advice);
                    }
                },
                default(POLL_INTERVAL) => {}
            }
        }

        // Final drain: only what is already queued. Turns are still
        // recorded, but no advice is requested whose result nobody reads.
        self.stopping = true;
        for outcome in emotion_rx.try_iter() {
            self.handle_emotion(outcome);
        }
        for fragment in speech_rx.try_iter() {
            self.handle_speech(fragment);
        }
        self.emotion_finished();
        for command in control_rx.try_iter() {
            self.handle_control(command);
        }
        for advice in advice_rx.try_iter() {
            self.handle_advice(advice);
        }

        tracing::debug!(
            words = self.aggregator.state().word_count(),
            turns = self.aggregator.state().history().len(),
            "dispatcher stopped"
        );
        self.aggregator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::{MockAdvisor, advice_slot};
    use crate::pipeline::types::EmotionResult;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    fn dispatcher_with(advisor: MockAdvisor) -> (ResultDispatcher, Arc<Mutex<Vec<PipelineEvent>>>, Receiver<Advice>) {
        let observer = CollectingObserver::new();
        let events = observer.events();
        let (slot, advice_rx) = advice_slot();
        let worker = AdvisorWorker::new(Arc::new(advisor), slot);
        let dispatcher =
            ResultDispatcher::new(Box::new(observer), ConversationAggregator::new(50, 5), worker);
        (dispatcher, events, advice_rx)
    }

    fn dispatcher() -> (ResultDispatcher, Arc<Mutex<Vec<PipelineEvent>>>) {
        let (dispatcher, events, _) = dispatcher_with(MockAdvisor::new("advice"));
        (dispatcher, events)
    }

    fn classified(index: u64, label: EmotionLabel) -> EmotionOutcome {
        let mut logits = vec![0.0; 4];
        logits[label.index()] = 5.0;
        EmotionOutcome::Classified(EmotionResult {
            batch_index: index,
            distribution: EmotionDistribution::from_logits(&logits).unwrap(),
        })
    }

    fn speech(index: u64, text: &str) -> SpeechFragment {
        SpeechFragment {
            batch_index: index,
            text: text.to_string(),
            emotion_hint: None,
        }
    }

    fn speech_texts(events: &Arc<Mutex<Vec<PipelineEvent>>>) -> Vec<(String, String)> {
        events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Speech { text, emotion } => Some((text.clone(), emotion.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_speech_for_batch_zero_is_delivered_immediately() {
        let (mut dispatcher, events) = dispatcher();
        dispatcher.handle_speech(speech(0, "hello"));
        assert_eq!(
            speech_texts(&events),
            vec![("hello".to_string(), "neutral".to_string())]
        );
    }

    #[test]
    fn test_speech_waits_for_previous_emotion() {
        let (mut dispatcher, events) = dispatcher();

        dispatcher.handle_speech(speech(2, "later"));
        assert_eq!(dispatcher.pending_speech(), 1);
        assert!(events.lock().unwrap().is_empty());

        dispatcher.handle_emotion(classified(0, EmotionLabel::Anger));
        assert_eq!(dispatcher.pending_speech(), 1);

        dispatcher.handle_emotion(classified(1, EmotionLabel::Joy));
        assert_eq!(dispatcher.pending_speech(), 0);

        let recorded = events.lock().unwrap().clone();
        let emotion_indices: Vec<u64> = recorded
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Emotion { batch_index, .. } => Some(*batch_index),
                _ => None,
            })
            .collect();
        assert_eq!(emotion_indices, vec![0, 1]);
        assert!(matches!(recorded.last(), Some(PipelineEvent::Speech { .. })));
    }

    #[test]
    fn test_skipped_emotion_advances_watermark_without_event() {
        let (mut dispatcher, events) = dispatcher();
        dispatcher.handle_speech(speech(1, "text"));
        dispatcher.handle_emotion(EmotionOutcome::Skipped { batch_index: 0 });

        let recorded = events.lock().unwrap().clone();
        assert_eq!(recorded.len(), 1);
        assert!(matches!(recorded[0], PipelineEvent::Speech { .. }));
    }

    #[test]
    fn test_hint_uses_same_batch_emotion_when_available() {
        let (mut dispatcher, events) = dispatcher();
        dispatcher.handle_emotion(classified(0, EmotionLabel::Sadness));
        dispatcher.handle_emotion(classified(1, EmotionLabel::Joy));
        dispatcher.handle_speech(speech(0, "first"));
        dispatcher.handle_speech(speech(1, "second"));

        assert_eq!(
            speech_texts(&events),
            vec![
                ("first".to_string(), "sadness".to_string()),
                ("second".to_string(), "joy".to_string()),
            ]
        );
    }

    #[test]
    fn test_hint_falls_back_to_latest_emotion() {
        let (mut dispatcher, events) = dispatcher();
        dispatcher.handle_emotion(classified(0, EmotionLabel::Anger));
        // Batch 1 has no emotion result yet, but batch 0 has been reported.
        dispatcher.handle_speech(speech(1, "now"));
        assert_eq!(
            speech_texts(&events),
            vec![("now".to_string(), "anger".to_string())]
        );
    }

    #[test]
    fn test_recognizer_hint_wins() {
        let (mut dispatcher, events) = dispatcher();
        dispatcher.handle_emotion(classified(0, EmotionLabel::Anger));
        dispatcher.handle_speech(SpeechFragment {
            batch_index: 0,
            text: "yay".to_string(),
            emotion_hint: Some(EmotionLabel::Joy),
        });
        assert_eq!(speech_texts(&events)[0].1, "joy");
    }

    #[test]
    fn test_emotion_end_releases_held_speech() {
        let (mut dispatcher, events) = dispatcher();
        dispatcher.handle_speech(speech(5, "a"));
        dispatcher.handle_speech(speech(6, "b"));
        dispatcher.emotion_finished();
        assert_eq!(speech_texts(&events).len(), 2);
    }

    #[test]
    fn test_speech_feeds_aggregator() {
        let (mut dispatcher, _events) = dispatcher();
        dispatcher.handle_speech(speech(0, "one two three"));
        assert_eq!(dispatcher.aggregator().state().word_count(), 3);
    }

    #[test]
    fn test_threshold_triggers_advice_once_per_flight() {
        let advisor = MockAdvisor::new("tip").with_delay(Duration::from_millis(200));
        let calls = advisor.call_counter();
        let (mut dispatcher, _events, advice_rx) = dispatcher_with(advisor);

        dispatcher.handle_control(ControlCommand::SetGoal("win".to_string()));
        dispatcher.handle_speech(speech(0, "a b c d e"));
        dispatcher.handle_speech(speech(0, "f g h i j"));
        dispatcher.handle_speech(speech(0, "k l m n o"));

        let advice = advice_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        dispatcher.handle_advice(advice);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_manual_advice_requires_goal_and_history() {
        let (mut dispatcher, _events) = dispatcher();
        assert!(!dispatcher.request_advice());

        dispatcher.handle_control(ControlCommand::SetGoal("goal".to_string()));
        assert!(!dispatcher.request_advice());

        dispatcher.handle_speech(speech(0, "hi"));
        assert!(dispatcher.request_advice());
    }

    #[test]
    fn test_advice_reaches_observer() {
        let (mut dispatcher, events) = dispatcher();
        dispatcher.handle_advice(Advice {
            text: "listen more".to_string(),
            fallback: false,
        });
        assert_eq!(
            events.lock().unwrap()[0],
            PipelineEvent::Advice {
                text: "listen more".to_string()
            }
        );
    }

    struct CountingObserver {
        thread_names: Arc<Mutex<Vec<String>>>,
        count: Arc<AtomicUsize>,
    }

    impl PipelineObserver for CountingObserver {
        fn on_speech(&mut self, _text: &str, _emotion_label: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
            if let Some(name) = thread::current().name() {
                self.thread_names.lock().unwrap().push(name.to_string());
            }
        }
    }

    #[test]
    fn test_run_delivers_until_streams_close() {
        let names = Arc::new(Mutex::new(Vec::new()));
        let count = Arc::new(AtomicUsize::new(0));
        let observer = CountingObserver {
            thread_names: names.clone(),
            count: count.clone(),
        };
        let (slot, advice_rx) = advice_slot();
        let worker = AdvisorWorker::new(Arc::new(MockAdvisor::new("x")), slot);
        let dispatcher =
            ResultDispatcher::new(Box::new(observer), ConversationAggregator::default(), worker);

        let (emotion_tx, emotion_rx) = unbounded();
        let (speech_tx, speech_rx) = unbounded();
        let (_control_tx, control_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let handle = thread::Builder::new()
            .name("dispatch".to_string())
            .spawn(move || dispatcher.run(emotion_rx, speech_rx, control_rx, advice_rx, running))
            .unwrap();

        speech_tx.send(speech(0, "zero")).unwrap();
        speech_tx.send(speech(1, "one")).unwrap();
        emotion_tx.send(classified(0, EmotionLabel::Joy)).unwrap();
        drop(emotion_tx);
        drop(speech_tx);

        let aggregator = handle.join().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(aggregator.state().history().len(), 2);
        assert!(names.lock().unwrap().iter().all(|n| n == "dispatch"));
    }

    #[test]
    fn test_run_stops_on_cancellation() {
        let (slot, advice_rx) = advice_slot();
        let worker = AdvisorWorker::new(Arc::new(MockAdvisor::new("x")), slot);
        let dispatcher = ResultDispatcher::new(
            Box::new(CollectingObserver::new()),
            ConversationAggregator::default(),
            worker,
        );

        let (_emotion_tx, emotion_rx) = unbounded::<EmotionOutcome>();
        let (speech_tx, speech_rx) = unbounded();
        let (_control_tx, control_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        speech_tx.send(speech(3, "held")).unwrap();
        let flag = running.clone();
        let handle = thread::spawn(move || {
            dispatcher.run(emotion_rx, speech_rx, control_rx, advice_rx, flag)
        });

        thread::sleep(Duration::from_millis(100));
        running.store(false, Ordering::SeqCst);
        let aggregator = handle.join().unwrap();

        // Held speech is released on the way out.
        assert_eq!(aggregator.state().history().len(), 1);
    }

    #[test]
    fn test_no_advice_requested_after_cancellation() {
        let advisor = MockAdvisor::new("late advice");
        let calls = advisor.call_counter();
        let (mut dispatcher, events, advice_rx) = dispatcher_with(advisor);
        dispatcher.handle_control(ControlCommand::SetGoal("finish early".to_string()));

        let (_emotion_tx, emotion_rx) = unbounded::<EmotionOutcome>();
        let (speech_tx, speech_rx) = unbounded();
        let (control_tx, control_rx) = unbounded();
        let (reply_tx, reply_rx) = unbounded();
        // Five words crosses the automatic threshold of this aggregator.
        speech_tx
            .send(speech(0, "one two three four five"))
            .unwrap();
        control_tx.send(ControlCommand::RequestAdvice(reply_tx)).unwrap();

        let running = Arc::new(AtomicBool::new(false));
        let aggregator = dispatcher.run(emotion_rx, speech_rx, control_rx, advice_rx, running);

        assert_eq!(reply_rx.try_recv(), Ok(false));
        assert_eq!(aggregator.state().history().len(), 1);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            speech_texts(&events),
            vec![("one two three four five".to_string(), "neutral".to_string())]
        );
        assert!(
            !events
                .lock()
                .unwrap()
                .iter()
                .any(|e| matches!(e, PipelineEvent::Advice { .. }))
        );
    }
}
