//! Serialized spoken feedback.
//!
//! Utterances go through an explicit FIFO owned by the queue, with a
//! `speaking` flag standing in for the audio device being busy: `say`
//! speaks immediately when the pipeline is idle (or the request is
//! urgent) and enqueues otherwise, and `utterance_finished` dequeues the
//! next item. Actual audio output is behind the `SpeechSink` trait; the
//! pipeline itself never blocks on playback.

use std::collections::VecDeque;

use anyhow::Result;

use crate::config::FeedbackMessages;

pub trait SpeechSink {
    fn speak(&mut self, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechPriority {
    Normal,
    Urgent,
}

#[derive(Debug)]
pub struct SpeechQueue<S> {
    sink: S,
    pending: VecDeque<String>,
    speaking: bool,
    messages: FeedbackMessages,
    confirmation_cursor: usize,
    error_cursor: usize,
    processing_cursor: usize,
}

impl<S: SpeechSink> SpeechQueue<S> {
    pub fn new(sink: S, messages: FeedbackMessages) -> Self {
        Self {
            sink,
            pending: VecDeque::new(),
            speaking: false,
            messages,
            confirmation_cursor: 0,
            error_cursor: 0,
            processing_cursor: 0,
        }
    }

    /// Speak now when urgent or idle, otherwise queue behind the current
    /// utterance.
    pub fn say(&mut self, text: &str, priority: SpeechPriority) -> Result<()> {
        if priority == SpeechPriority::Urgent || (!self.speaking && self.pending.is_empty()) {
            return self.speak_now(text);
        }
        self.pending.push_back(text.to_string());
        Ok(())
    }

    /// Signal that the sink finished the current utterance; drains the
    /// next queued item, if any.
    pub fn utterance_finished(&mut self) -> Result<()> {
        self.speaking = false;
        if let Some(next) = self.pending.pop_front() {
            self.speak_now(&next)?;
        }
        Ok(())
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.speaking = false;
    }

    pub fn say_processing(&mut self) -> Result<()> {
        let Some(message) = next_message(&self.messages.processing, &mut self.processing_cursor)
        else {
            return Ok(());
        };
        self.say(&message, SpeechPriority::Normal)
    }

    pub fn say_confirmation(&mut self) -> Result<()> {
        let Some(message) =
            next_message(&self.messages.confirmation, &mut self.confirmation_cursor)
        else {
            return Ok(());
        };
        self.say(&message, SpeechPriority::Urgent)
    }

    pub fn say_error(&mut self) -> Result<()> {
        let Some(message) = next_message(&self.messages.error, &mut self.error_cursor) else {
            return Ok(());
        };
        self.say(&message, SpeechPriority::Urgent)
    }

    fn speak_now(&mut self, text: &str) -> Result<()> {
        self.speaking = true;
        self.sink.speak(text)
    }
}

fn next_message(pool: &[String], cursor: &mut usize) -> Option<String> {
    if pool.is_empty() {
        return None;
    }
    let message = pool[*cursor % pool.len()].clone();
    *cursor += 1;
    Some(message)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::config::FeedbackMessages;

    use super::{SpeechPriority, SpeechQueue, SpeechSink};

    #[derive(Debug, Clone, Default)]
    struct RecordingSink {
        spoken: Rc<RefCell<Vec<String>>>,
    }

    impl SpeechSink for RecordingSink {
        fn speak(&mut self, text: &str) -> anyhow::Result<()> {
            self.spoken.borrow_mut().push(text.to_string());
            Ok(())
        }
    }

    fn queue() -> (SpeechQueue<RecordingSink>, Rc<RefCell<Vec<String>>>) {
        let sink = RecordingSink::default();
        let spoken = sink.spoken.clone();
        (SpeechQueue::new(sink, FeedbackMessages::default()), spoken)
    }

    #[test]
    fn idle_queue_speaks_immediately() -> anyhow::Result<()> {
        let (mut queue, spoken) = queue();
        queue.say("hello", SpeechPriority::Normal)?;
        assert_eq!(spoken.borrow().as_slice(), ["hello"]);
        assert!(queue.is_speaking());
        Ok(())
    }

    #[test]
    fn busy_queue_holds_normal_utterances_in_fifo_order() -> anyhow::Result<()> {
        let (mut queue, spoken) = queue();
        queue.say("first", SpeechPriority::Normal)?;
        queue.say("second", SpeechPriority::Normal)?;
        queue.say("third", SpeechPriority::Normal)?;
        assert_eq!(spoken.borrow().as_slice(), ["first"]);
        assert_eq!(queue.pending_len(), 2);

        queue.utterance_finished()?;
        queue.utterance_finished()?;
        queue.utterance_finished()?;
        assert_eq!(spoken.borrow().as_slice(), ["first", "second", "third"]);
        assert_eq!(queue.pending_len(), 0);
        assert!(!queue.is_speaking());
        Ok(())
    }

    #[test]
    fn urgent_bypasses_the_queue() -> anyhow::Result<()> {
        let (mut queue, spoken) = queue();
        queue.say("long story", SpeechPriority::Normal)?;
        queue.say("waiting", SpeechPriority::Normal)?;
        queue.say("watch out", SpeechPriority::Urgent)?;
        assert_eq!(spoken.borrow().as_slice(), ["long story", "watch out"]);
        // The queued item is still there for later.
        assert_eq!(queue.pending_len(), 1);
        Ok(())
    }

    #[test]
    fn message_pools_rotate_round_robin() -> anyhow::Result<()> {
        let (mut queue, spoken) = queue();
        queue.say_confirmation()?;
        queue.say_confirmation()?;
        let pool = FeedbackMessages::default().confirmation;
        assert_eq!(spoken.borrow().as_slice(), &pool[..2]);
        Ok(())
    }

    #[test]
    fn empty_pool_is_silent() -> anyhow::Result<()> {
        let sink = RecordingSink::default();
        let spoken = sink.spoken.clone();
        let mut queue = SpeechQueue::new(
            sink,
            FeedbackMessages {
                confirmation: Vec::new(),
                error: Vec::new(),
                processing: Vec::new(),
            },
        );
        queue.say_processing()?;
        queue.say_error()?;
        assert!(spoken.borrow().is_empty());
        Ok(())
    }
}
