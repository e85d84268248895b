/// A channel-prefix command handled locally as a synchronous query on
/// C5/C4, without going through the router (spec §4.6 step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Status,
    Cancel,
    New,
    /// Free text that should skip C3 routing and go straight to the
    /// session's current role.
    Ask(String),
    Approve { id: String, decision: ApproveDecision },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproveDecision {
    Approve,
    Reject,
    Always,
}

/// Parse a `!command [args]` line. Returns `None` for plain free text.
pub fn parse_command(text: &str) -> Option<Command> {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix('!')?;
    let mut parts = body.splitn(2, char::is_whitespace);
    let verb = parts.next().unwrap_or("").to_lowercase();
    let rest = parts.next().unwrap_or("").trim();

    match verb.as_str() {
        "status" => Some(Command::Status),
        "cancel" => Some(Command::Cancel),
        "new" => Some(Command::New),
        "ask" if !rest.is_empty() => Some(Command::Ask(rest.to_string())),
        "approve" => parse_approve(rest),
        _ => None,
    }
}

fn parse_approve(rest: &str) -> Option<Command> {
    let mut it = rest.split_whitespace();
    let id = it.next()?.to_string();
    let decision = match it.next().unwrap_or("yes").to_lowercase().as_str() {
        "no" | "reject" | "n" => ApproveDecision::Reject,
        "always" => ApproveDecision::Always,
        _ => ApproveDecision::Approve,
    };
    Some(Command::Approve { id, decision })
}
