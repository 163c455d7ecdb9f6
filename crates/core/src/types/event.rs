//! Link status and data events surfaced to consumers

/// Connection lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// Port opened; carries the human-readable port description
    Connected { port: String },
    /// Link is down; fired exactly once per connection
    Disconnected { reason: String },
    /// Non-fatal fault report
    Error { message: String },
}

/// Event delivered from the transport to its consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One decoded line, trailing whitespace stripped
    Line(String),
    /// Lifecycle transition
    Status(LinkStatus),
}

impl LinkEvent {
    /// Shorthand for a disconnected status event
    pub fn disconnected(reason: impl Into<String>) -> Self {
        Self::Status(LinkStatus::Disconnected {
            reason: reason.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_shorthand() {
        let event = LinkEvent::disconnected("unplugged");
        assert_eq!(
            event,
            LinkEvent::Status(LinkStatus::Disconnected {
                reason: "unplugged".to_string()
            })
        );
    }
}
