//! RefineLoop - bounded generate, validate, refine
//!
//! Each attempt produces a candidate with the current guidance, logs the raw
//! production, has the candidate judged, and logs the judgment. An accepted
//! candidate ends the loop; a rejected one feeds the validator's guidance
//! into the next attempt until the attempt cap is reached.

use log::{debug, info, warn};

use super::traits::{Producer, Validator};
use crate::audit::{LogEntry, Logger};
use crate::error::{DeusError, Result};
use crate::feedback::Feedback;

/// An accepted candidate and what it took to get it.
#[derive(Debug, Clone)]
pub struct Refined<T> {
    pub value: T,
    pub attempts: u32,
    pub feedback: Feedback,
}

#[derive(Debug, Clone, Copy)]
pub struct RefineLoop {
    max_attempts: u32,
}

impl RefineLoop {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run until the validator accepts or `max_attempts` candidates were
    /// rejected.
    ///
    /// Unparseable producer output fails with `MalformedOutput` without
    /// reaching the validator; an unparseable verdict is logged, then fails
    /// the same way. Exhaustion fails with `RetryExhausted`
    /// carrying the last rejection.
    pub async fn run<P, V>(&self, logger: &mut Logger, producer: &P, validator: &V) -> Result<Refined<P::Candidate>>
    where
        P: Producer + ?Sized,
        V: Validator<P::Candidate> + ?Sized,
    {
        let field = producer.field().to_string();
        let mut guidance = String::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("{}: attempt {}/{}", field, attempt, self.max_attempts);

            let production = producer.produce(&guidance).await?;
            logger.log(production.entry);
            let Some(candidate) = production.candidate else {
                warn!("{}: unusable output on attempt {}", field, attempt);
                return Err(DeusError::malformed(field, production.problem));
            };

            let review = validator.review(&candidate).await?;
            logger.log(
                LogEntry::validation(&field, review.prompt, review.response, review.guidance.clone())
                    .with_feedback(review.feedback.clone()),
            );
            if let Some(problem) = review.problem {
                warn!("{}: unusable verdict on attempt {}", field, attempt);
                return Err(DeusError::malformed(field, problem));
            }

            if review.feedback.is_success() {
                info!("{}: accepted on attempt {}", field, attempt);
                return Ok(Refined {
                    value: candidate,
                    attempts: attempt,
                    feedback: review.feedback,
                });
            }

            if attempt >= self.max_attempts {
                warn!("{}: rejected {} times, giving up", field, attempt);
                return Err(DeusError::RetryExhausted {
                    field,
                    attempts: attempt,
                    last: review.feedback,
                });
            }

            guidance = if review.guidance.is_empty() {
                review.feedback.message().to_string()
            } else {
                review.guidance
            };
            debug!("{}: rejected, retrying with guidance: {}", field, guidance);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::audit::LogKind;
    use crate::domain::Context;
    use crate::feedback::FailureCategory;
    use crate::refine::{Production, Review};

    /// Returns queued candidates and records the guidance it was given.
    struct QueueProducer {
        outputs: Mutex<Vec<Option<String>>>,
        seen: Mutex<Vec<String>>,
    }

    impl QueueProducer {
        fn new(outputs: Vec<Option<&str>>) -> Self {
            Self {
                outputs: Mutex::new(outputs.into_iter().rev().map(|o| o.map(str::to_string)).collect()),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Producer for QueueProducer {
        type Candidate = String;

        fn field(&self) -> &str {
            "description"
        }

        async fn produce(&self, guidance: &str) -> Result<Production<String>> {
            self.seen.lock().unwrap().push(guidance.to_string());
            let next = self.outputs.lock().unwrap().pop().unwrap_or(None);
            let entry = LogEntry::retrieval("description", "p", next.clone().unwrap_or_default(), None);
            Ok(match next {
                Some(text) => Production::parsed(text, entry),
                None => Production::malformed("no JSON object in response", entry),
            })
        }
    }

    /// Accepts candidates shorter than the limit.
    struct ShortValidator {
        limit: usize,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl Validator<String> for ShortValidator {
        async fn review(&self, candidate: &String) -> Result<Review> {
            *self.calls.lock().unwrap() += 1;
            if candidate.len() < self.limit {
                Ok(Review::local(Feedback::success("concise"), ""))
            } else {
                Ok(Review::local(Feedback::failure("too verbose"), "shorten to one sentence"))
            }
        }
    }

    fn validator(limit: usize) -> ShortValidator {
        ShortValidator {
            limit,
            calls: Mutex::new(0),
        }
    }

    fn logger() -> Logger {
        Logger::new(&Context::new("q"))
    }

    #[tokio::test]
    async fn test_accepts_first_candidate() {
        let mut logger = logger();
        let producer = QueueProducer::new(vec![Some("short")]);
        let refined = RefineLoop::new(3).run(&mut logger, &producer, &validator(10)).await.unwrap();
        assert_eq!(refined.value, "short");
        assert_eq!(refined.attempts, 1);
        assert_eq!(logger.head().logs.len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_then_correction() {
        let mut logger = logger();
        let producer = QueueProducer::new(vec![Some("a very long winded description"), Some("short")]);
        let refined = RefineLoop::new(5).run(&mut logger, &producer, &validator(10)).await.unwrap();

        assert_eq!(refined.value, "short");
        assert_eq!(refined.attempts, 2);
        assert_eq!(*producer.seen.lock().unwrap(), vec!["", "shorten to one sentence"]);

        let retrievals = logger.entries().filter(|e| e.is_retrieval_of("description")).count();
        let validations = logger.entries().filter(|e| e.is_validation_of("description")).count();
        assert_eq!((retrievals, validations), (2, 2));

        let LogKind::Validation {
            validation_instructions,
            ..
        } = &logger.head().logs[1].kind
        else {
            panic!("expected validation entry");
        };
        assert_eq!(validation_instructions, "shorten to one sentence");
    }

    #[tokio::test]
    async fn test_exhausts_after_exactly_n_attempts() {
        let mut logger = logger();
        let producer = QueueProducer::new(vec![Some("far too long to accept"); 10]);
        let validator = validator(0);
        let err = RefineLoop::new(4).run(&mut logger, &producer, &validator).await.unwrap_err();

        match err {
            DeusError::RetryExhausted { attempts, last, .. } => {
                assert_eq!(attempts, 4);
                assert_eq!(last.message(), "too verbose");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*validator.calls.lock().unwrap(), 4);
        assert_eq!(producer.seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_malformed_never_validated() {
        let mut logger = logger();
        let producer = QueueProducer::new(vec![None]);
        let validator = validator(100);
        let err = RefineLoop::new(3).run(&mut logger, &producer, &validator).await.unwrap_err();

        assert!(matches!(err, DeusError::MalformedOutput { .. }));
        assert_eq!(*validator.calls.lock().unwrap(), 0);
        // the raw production is still on record
        assert_eq!(logger.head().logs.len(), 1);
    }

    /// Answers every candidate with an unreadable verdict.
    struct GarbledValidator;

    #[async_trait]
    impl Validator<String> for GarbledValidator {
        async fn review(&self, _candidate: &String) -> Result<Review> {
            Ok(Review::malformed(
                "no JSON object in response",
                "[validate_description]".to_string(),
                "Sorry, I cannot judge that".to_string(),
            ))
        }
    }

    #[tokio::test]
    async fn test_malformed_verdict_logged_then_aborts() {
        let mut logger = logger();
        let producer = QueueProducer::new(vec![Some("short"), Some("short")]);
        let err = RefineLoop::new(3).run(&mut logger, &producer, &GarbledValidator).await.unwrap_err();

        match err {
            DeusError::MalformedOutput { field, reason } => {
                assert_eq!(field, "description");
                assert_eq!(reason, "no JSON object in response");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(producer.seen.lock().unwrap().len(), 1);

        let logs = &logger.head().logs;
        assert_eq!(logs.len(), 2);
        assert!(logs[1].is_validation_of("description"));
        let feedback = logs[1].feedback.as_ref().unwrap();
        assert_eq!(feedback.category(), Some(FailureCategory::MalformedOutput));
        let LogKind::Validation { response, .. } = &logs[1].kind else {
            panic!("expected validation entry");
        };
        assert_eq!(response, "Sorry, I cannot judge that");
    }

    #[tokio::test]
    async fn test_zero_attempts_clamped() {
        let mut logger = logger();
        let producer = QueueProducer::new(vec![Some("x")]);
        let refined = RefineLoop::new(0).run(&mut logger, &producer, &validator(10)).await.unwrap();
        assert_eq!(refined.attempts, 1);
    }
}
