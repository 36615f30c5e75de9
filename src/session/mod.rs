// Per-user chat session state
// Owned by the front end and threaded through each question


use std::fmt;

use tracing::{info, warn};

use crate::RagError;
use crate::pipeline::{Answer, RagPipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

/// Authentication flag and visible transcript for one person chatting.
///
/// The transcript is for display only, the pipeline never sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    password: Option<String>,
    authenticated: bool,
    transcript: Vec<ConversationTurn>,
}

impl Session {
    /// A session gated by `password`, or open when there is none
    #[inline]
    pub fn new(password: Option<String>) -> Self {
        let password = password.filter(|p| !p.is_empty());
        Self {
            authenticated: password.is_none(),
            password,
            transcript: Vec::new(),
        }
    }

    #[inline]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    #[inline]
    pub fn requires_password(&self) -> bool {
        self.password.is_some()
    }

    #[inline]
    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    /// Check `attempt` against the session password.
    ///
    /// Returns the updated session and whether the attempt succeeded. An already
    /// authenticated session stays authenticated.
    #[inline]
    #[must_use]
    pub fn authenticate(mut self, attempt: &str) -> (Self, bool) {
        if self.authenticated {
            return (self, true);
        }

        let accepted = self.password.as_deref() == Some(attempt);
        if accepted {
            info!("Session authenticated");
            self.authenticated = true;
        } else {
            warn!("Rejected incorrect password");
        }
        (self, accepted)
    }

    /// Ask `question` through `pipeline` and record both sides in the transcript.
    ///
    /// Failures are recorded as their user-facing message.
    #[inline]
    pub async fn ask(
        mut self,
        pipeline: &RagPipeline,
        question: &str,
    ) -> (Self, crate::Result<Answer>) {
        if !self.authenticated {
            return (self, Err(RagError::Unauthenticated));
        }

        self.push(Role::User, question);
        let result = pipeline.answer(question).await;
        match &result {
            Ok(answer) => self.push(Role::Assistant, &answer.text),
            Err(e) => self.push(Role::Assistant, &e.user_message()),
        }
        (self, result)
    }

    fn push(&mut self, role: Role, text: &str) {
        self.transcript.push(ConversationTurn {
            role,
            text: text.to_string(),
        });
    }
}
