//! Typed events parsed from baresip's stdout

/// Marker for a new inbound call
const INCOMING_CALL_MARKER: &str = "incoming call from";

/// Markers for a call that has gone away
const CALL_ENDED_MARKERS: [&str; 2] = ["call terminated", "call closed"];

/// What a signaling line means to the call session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A call is ringing and can be accepted
    IncomingCall,
    /// The remote side hung up or the call failed
    CallEnded,
    /// Anything else baresip prints (registration, re-INVITE, media info...)
    Other,
    /// The event stream itself ended (process exited or closed stdout)
    StreamClosed,
}

/// One classified line of the event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingEvent {
    pub kind: EventKind,
    /// Original text, kept for diagnostics
    pub raw_line: String,
}

impl SignalingEvent {
    pub fn new(kind: EventKind, raw_line: impl Into<String>) -> Self {
        Self {
            kind,
            raw_line: raw_line.into(),
        }
    }

    /// Event emitted once by the monitor after the last line
    pub fn stream_closed() -> Self {
        Self::new(EventKind::StreamClosed, "")
    }

    pub fn is_incoming_call(&self) -> bool {
        self.kind == EventKind::IncomingCall
    }

    /// Explicit call end, or stream closure standing in for one
    pub fn ends_call(&self) -> bool {
        matches!(self.kind, EventKind::CallEnded | EventKind::StreamClosed)
    }

    /// Caller text following `incoming call from`, if any
    ///
    /// `"INVITE from alice@example.com: incoming call from Alice"` yields
    /// `Some("Alice")`.
    pub fn caller(&self) -> Option<&str> {
        if self.kind != EventKind::IncomingCall {
            return None;
        }
        // ASCII lowercasing keeps byte offsets valid in the original line
        let lowered = self.raw_line.to_ascii_lowercase();
        let start = lowered.find(INCOMING_CALL_MARKER)? + INCOMING_CALL_MARKER.len();
        let caller = self.raw_line[start..].trim();
        if caller.is_empty() {
            None
        } else {
            Some(caller)
        }
    }
}

/// Classify one line of baresip output
///
/// Matching is case-insensitive substring search. Lines that mention both an
/// incoming call and a call end are treated as incoming calls.
pub fn classify(line: &str) -> SignalingEvent {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let lowered = trimmed.to_lowercase();

    let kind = if lowered.contains(INCOMING_CALL_MARKER) {
        EventKind::IncomingCall
    } else if CALL_ENDED_MARKERS.iter().any(|m| lowered.contains(m)) {
        EventKind::CallEnded
    } else {
        EventKind::Other
    };

    SignalingEvent::new(kind, trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incoming_call() {
        let event = classify("INVITE from alice@example.com: incoming call from Alice");
        assert_eq!(event.kind, EventKind::IncomingCall);
        assert_eq!(event.caller(), Some("Alice"));
        assert!(event.is_incoming_call());
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("Incoming Call From <sip:bob@host>").kind, EventKind::IncomingCall);
        assert_eq!(classify("sip:bob@host: CALL TERMINATED").kind, EventKind::CallEnded);
        assert_eq!(classify("Call Closed (duration 12s)").kind, EventKind::CallEnded);
    }

    #[test]
    fn test_call_ended() {
        let event = classify("BYE received: call terminated");
        assert_eq!(event.kind, EventKind::CallEnded);
        assert!(event.ends_call());
        assert_eq!(event.caller(), None);
    }

    #[test]
    fn test_other_lines() {
        for line in ["re-INVITE", "", "ua: registered sip:bot@example.com", "call established"] {
            assert_eq!(classify(line).kind, EventKind::Other, "line: {:?}", line);
        }
    }

    #[test]
    fn test_raw_line_kept_without_newline() {
        let event = classify("re-INVITE\r\n");
        assert_eq!(event.raw_line, "re-INVITE");
    }

    #[test]
    fn test_caller_missing() {
        assert_eq!(classify("incoming call from   ").caller(), None);
    }

    #[test]
    fn test_stream_closed_ends_call() {
        let event = SignalingEvent::stream_closed();
        assert_eq!(event.kind, EventKind::StreamClosed);
        assert!(event.ends_call());
    }
}
