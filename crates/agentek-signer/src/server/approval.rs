//! Interactive approval of signing requests.
//!
//! The daemon asks an [`Approver`] before signing anything the policy flags.
//! [`TerminalApprover`] prompts on stderr and reads the operator's answers
//! from stdin. Prompts are not serialized: several requests can be waiting
//! at once, each with its own deadline, and typed answers go to the waiting
//! requests in arrival order. A line typed before a prompt was shown never
//! answers that prompt.

use std::io::BufRead;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy_primitives::utils::format_ether;
use alloy_primitives::U256;
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// What the operator is asked to approve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalRequest {
    /// A transaction.
    Transaction {
        /// Recipient, `None` for contract creation.
        to: Option<String>,
        /// Value in wei.
        value: U256,
        /// Target chain.
        chain_id: Option<u64>,
    },
    /// A personal message.
    Message {
        /// Truncated text or a hex rendering.
        preview: String,
    },
    /// EIP-712 typed data.
    TypedData {
        /// The `primaryType` of the payload.
        primary_type: String,
    },
}

impl ApprovalRequest {
    /// One-line description for the prompt.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Transaction {
                to,
                value,
                chain_id,
            } => format!(
                "sign transaction to {} for {} ETH on chain {}",
                to.as_deref().unwrap_or("<contract creation>"),
                format_ether(*value),
                chain_id.map_or_else(|| "<unspecified>".to_string(), |id| id.to_string()),
            ),
            Self::Message { preview } => format!("sign message \"{preview}\""),
            Self::TypedData { primary_type } => format!("sign typed data ({primary_type})"),
        }
    }
}

/// The operator's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// Approved.
    Approved,
    /// Refused, or no answer could be read.
    Denied,
    /// No answer before the deadline.
    TimedOut,
}

impl ApprovalOutcome {
    /// Returns true for [`ApprovalOutcome::Approved`].
    #[must_use]
    pub const fn is_approved(self) -> bool {
        matches!(self, Self::Approved)
    }

    /// Reason text for a denial response.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Denied => "request rejected by operator",
            Self::TimedOut => "approval timed out",
        }
    }
}

/// Decides whether a flagged request may be signed.
#[async_trait]
pub trait Approver: Send + Sync {
    /// Ask for approval, giving up after `timeout`.
    async fn request_approval(&self, request: &ApprovalRequest, timeout: Duration)
        -> ApprovalOutcome;
}

/// Returns true for `y` or `yes`, ignoring case and surrounding whitespace.
#[must_use]
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// A line read from the operator, stamped with when it arrived.
type Answer = (Instant, String);

/// Prompts on stderr and reads answers from a shared line source.
pub struct TerminalApprover {
    answers: Arc<Mutex<mpsc::UnboundedReceiver<Answer>>>,
}

impl std::fmt::Debug for TerminalApprover {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalApprover").finish_non_exhaustive()
    }
}

impl TerminalApprover {
    /// Read answers from the process's stdin.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the reader thread cannot be spawned.
    pub fn stdin() -> std::io::Result<Self> {
        Self::from_reader(std::io::BufReader::new(std::io::stdin()))
    }

    /// Read answers line by line from `reader` on a dedicated thread.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the reader thread cannot be spawned.
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::Builder::new()
            .name("approval-input".into())
            .spawn(move || {
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    if tx.send((Instant::now(), line)).is_err() {
                        break;
                    }
                }
                debug!("approval input closed");
            })?;

        Ok(Self {
            answers: Arc::new(Mutex::new(rx)),
        })
    }
}

#[async_trait]
impl Approver for TerminalApprover {
    async fn request_approval(
        &self,
        request: &ApprovalRequest,
        timeout: Duration,
    ) -> ApprovalOutcome {
        let asked_at = Instant::now();
        eprintln!(
            "\n[agentek] Approve: {}? [y/N] (auto-deny in {}s)",
            request.summary(),
            timeout.as_secs()
        );

        let answer = tokio::time::timeout(timeout, async {
            let mut answers = self.answers.lock().await;
            // Lines typed before this prompt belong to an earlier, closed one.
            while let Some((received, line)) = answers.recv().await {
                if received >= asked_at {
                    return Some(line);
                }
                debug!("discarding answer typed before the prompt");
            }
            None
        })
        .await;

        match answer {
            Ok(Some(line)) if is_affirmative(&line) => ApprovalOutcome::Approved,
            Ok(_) => ApprovalOutcome::Denied,
            Err(_) => {
                eprintln!("[agentek] Approval timed out, request denied.");
                ApprovalOutcome::TimedOut
            }
        }
    }
}

/// Answers every request the same way, optionally after a delay.
#[derive(Debug)]
pub struct StaticApprover {
    approve: bool,
    delay: Duration,
    asked: AtomicUsize,
}

impl StaticApprover {
    /// Approves everything.
    #[must_use]
    pub const fn approve_all() -> Self {
        Self::new(true)
    }

    /// Denies everything.
    #[must_use]
    pub const fn deny_all() -> Self {
        Self::new(false)
    }

    const fn new(approve: bool) -> Self {
        Self {
            approve,
            delay: Duration::ZERO,
            asked: AtomicUsize::new(0),
        }
    }

    /// Wait `delay` before answering. A delay past the request's timeout
    /// yields [`ApprovalOutcome::TimedOut`].
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// How many approvals have been requested.
    #[must_use]
    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Approver for StaticApprover {
    async fn request_approval(
        &self,
        _request: &ApprovalRequest,
        timeout: Duration,
    ) -> ApprovalOutcome {
        self.asked.fetch_add(1, Ordering::SeqCst);
        if self.delay > timeout {
            tokio::time::sleep(timeout).await;
            return ApprovalOutcome::TimedOut;
        }
        tokio::time::sleep(self.delay).await;
        if self.approve {
            ApprovalOutcome::Approved
        } else {
            ApprovalOutcome::Denied
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use std::io::{Cursor, Read};

    fn message() -> ApprovalRequest {
        ApprovalRequest::Message {
            preview: "hello".into(),
        }
    }

    #[test]
    fn test_affirmative_answers() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative(" YES \n"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("no"));
        assert!(!is_affirmative("yep"));
    }

    #[test]
    fn test_summaries() {
        let tx = ApprovalRequest::Transaction {
            to: Some("0xabc".into()),
            value: U256::from(60_000_000_000_000_000u64),
            chain_id: Some(8453),
        };
        let summary = tx.summary();
        assert!(summary.contains("0xabc"));
        assert!(summary.contains("0.06"));
        assert!(summary.contains("8453"));

        let typed = ApprovalRequest::TypedData {
            primary_type: "Permit".into(),
        };
        assert!(typed.summary().contains("Permit"));
        assert!(message().summary().contains("hello"));
    }

    #[tokio::test]
    async fn test_terminal_answers_in_order() {
        let (input, reader) = scripted_reader();
        let approver = TerminalApprover::from_reader(reader).unwrap();
        let timeout = Duration::from_secs(5);

        let answer_later = |line: &'static str| {
            let input = input.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                input.send(line.as_bytes().to_vec()).unwrap();
            })
        };

        answer_later("y\n");
        assert_eq!(
            approver.request_approval(&message(), timeout).await,
            ApprovalOutcome::Approved
        );
        answer_later("no\n");
        assert_eq!(
            approver.request_approval(&message(), timeout).await,
            ApprovalOutcome::Denied
        );

        // input closed: denies without waiting
        drop(input);
        assert_eq!(
            approver.request_approval(&message(), timeout).await,
            ApprovalOutcome::Denied
        );
    }

    #[tokio::test]
    async fn test_input_before_prompt_is_ignored() {
        let (input, reader) = scripted_reader();
        let approver = TerminalApprover::from_reader(reader).unwrap();

        input.send(b"y\n".to_vec()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let outcome = approver
            .request_approval(&message(), Duration::from_millis(200))
            .await;
        assert_eq!(outcome, ApprovalOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_late_answer_does_not_approve_next_request() {
        let (input, reader) = scripted_reader();
        let approver = TerminalApprover::from_reader(reader).unwrap();

        let first = approver
            .request_approval(&message(), Duration::from_millis(50))
            .await;
        assert_eq!(first, ApprovalOutcome::TimedOut);

        // The operator answers the closed prompt.
        input.send(b"y\n".to_vec()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let transfer = ApprovalRequest::Transaction {
            to: Some("0x00000000000000000000000000000000000000aa".into()),
            value: U256::from(100_000_000_000_000_000u64),
            chain_id: Some(1),
        };
        let second = approver
            .request_approval(&transfer, Duration::from_millis(200))
            .await;
        assert_eq!(second, ApprovalOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_concurrent_prompts_have_their_own_deadlines() {
        let (input, reader) = scripted_reader();
        let approver = TerminalApprover::from_reader(reader).unwrap();

        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(300));
            input.send(b"yes\n".to_vec()).unwrap();
            input
        });

        let (patient_msg, hasty_msg) = (message(), message());
        let (patient, hasty) = tokio::join!(
            approver.request_approval(&patient_msg, Duration::from_secs(5)),
            approver.request_approval(&hasty_msg, Duration::from_millis(100)),
        );
        assert_eq!(hasty, ApprovalOutcome::TimedOut);
        assert_eq!(patient, ApprovalOutcome::Approved);
        drop(writer.join().unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_prompts_take_answers_in_arrival_order() {
        let (input, reader) = scripted_reader();
        let approver = TerminalApprover::from_reader(reader).unwrap();

        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            input.send(b"y\n".to_vec()).unwrap();
            input.send(b"n\n".to_vec()).unwrap();
            input
        });

        let timeout = Duration::from_secs(5);
        let (msg_a, msg_b) = (message(), message());
        let (a, b) = tokio::join!(
            approver.request_approval(&msg_a, timeout),
            approver.request_approval(&msg_b, timeout),
        );
        let mut outcomes = [a, b];
        outcomes.sort_by_key(|o| !o.is_approved());
        assert_eq!(outcomes, [ApprovalOutcome::Approved, ApprovalOutcome::Denied]);
        drop(writer.join().unwrap());
    }

    #[tokio::test]
    async fn test_terminal_times_out_without_input() {
        let (_keep_open, reader) = scripted_reader();
        let approver = TerminalApprover::from_reader(reader).unwrap();
        let outcome = approver
            .request_approval(&message(), Duration::from_millis(50))
            .await;
        assert_eq!(outcome, ApprovalOutcome::TimedOut);
        assert!(!outcome.is_approved());
    }

    #[tokio::test]
    async fn test_static_approver() {
        let yes = StaticApprover::approve_all();
        let no = StaticApprover::deny_all();
        let t = Duration::from_secs(1);
        assert!(yes.request_approval(&message(), t).await.is_approved());
        assert_eq!(no.request_approval(&message(), t).await, ApprovalOutcome::Denied);
        assert_eq!(yes.times_asked(), 1);
    }

    #[tokio::test]
    async fn test_static_delay_past_timeout() {
        let slow = StaticApprover::approve_all().with_delay(Duration::from_secs(10));
        let outcome = slow
            .request_approval(&message(), Duration::from_millis(20))
            .await;
        assert_eq!(outcome, ApprovalOutcome::TimedOut);
    }

    /// A reader that yields whatever is sent to it and reaches EOF once the
    /// sender is dropped.
    fn scripted_reader() -> (std::sync::mpsc::Sender<Vec<u8>>, impl BufRead + Send + 'static) {
        struct Scripted {
            chunks: std::sync::mpsc::Receiver<Vec<u8>>,
            pending: Cursor<Vec<u8>>,
        }
        impl std::io::Read for Scripted {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                loop {
                    let n = self.pending.read(buf)?;
                    if n > 0 || buf.is_empty() {
                        return Ok(n);
                    }
                    match self.chunks.recv() {
                        Ok(chunk) => self.pending = Cursor::new(chunk),
                        Err(_) => return Ok(0),
                    }
                }
            }
        }
        let (tx, rx) = std::sync::mpsc::channel();
        let reader = Scripted {
            chunks: rx,
            pending: Cursor::new(Vec::new()),
        };
        (tx, std::io::BufReader::new(reader))
    }
}
