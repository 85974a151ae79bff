//! Chat command surface
//!
//! Commands are `!`-prefixed text. Every command re-checks the caller's
//! permission against the specific session it touches, because permission
//! is account-scoped, not fleet-scoped. Missing permission yields silence
//! rather than an error, so callers cannot probe which sessions exist.

use std::sync::Arc;

use tracing::error;

use crate::fleet::{Fleet, FLEET_WILDCARD};
use crate::session::Session;
use crate::types::Permission;

/// Entry point for an inbound chat message addressed at `session`.
///
/// Returns the reply text, or `None` when the message is not a command,
/// the caller lacks permission, or the command produced nothing to say.
pub async fn response(
    fleet: &Arc<Fleet>,
    session: &Arc<Session>,
    caller_id: u64,
    message: &str,
) -> Option<String> {
    if caller_id == 0 || message.is_empty() {
        error!("command surface called with a zero caller id or empty message");
        return None;
    }

    if !message.starts_with('!') {
        return None;
    }

    let args: Vec<&str> = message.split_whitespace().collect();
    let command = args[0].to_ascii_uppercase();

    if args.len() == 1 {
        return match command.as_str() {
            "!2FA" => two_factor_token(Arc::clone(session), caller_id).await,
            "!2FANO" => confirm(Arc::clone(session), caller_id, false).await,
            "!2FAOK" => confirm(Arc::clone(session), caller_id, true).await,
            "!API" => api_status(fleet, caller_id).await,
            "!FARM" => farm(Arc::clone(session), caller_id).await,
            "!HELP" => help(Arc::clone(session), caller_id),
            "!LOOT" => loot(Arc::clone(session), caller_id).await,
            "!PAUSE" => pause(Arc::clone(session), caller_id, true).await,
            "!PAUSE~" => pause(Arc::clone(session), caller_id, false).await,
            "!RESUME" => resume(Arc::clone(session), caller_id).await,
            "!SA" => dispatch_status(fleet, caller_id, FLEET_WILDCARD).await,
            "!START" => start(Arc::clone(session), caller_id).await,
            "!STATUS" => status(Arc::clone(session), caller_id),
            "!STOP" => stop(Arc::clone(session), caller_id).await,
            "!VERSION" => version(Arc::clone(session), caller_id),
            _ => None,
        };
    }

    let selector = args[1];
    match command.as_str() {
        "!2FA" => {
            fleet
                .dispatch(caller_id, selector, |s| two_factor_token(s, caller_id))
                .await
        }
        "!2FANO" => {
            fleet
                .dispatch(caller_id, selector, |s| confirm(s, caller_id, false))
                .await
        }
        "!2FAOK" => {
            fleet
                .dispatch(caller_id, selector, |s| confirm(s, caller_id, true))
                .await
        }
        "!FARM" => fleet.dispatch(caller_id, selector, |s| farm(s, caller_id)).await,
        "!LOOT" => fleet.dispatch(caller_id, selector, |s| loot(s, caller_id)).await,
        "!PAUSE" => {
            fleet
                .dispatch(caller_id, selector, |s| pause(s, caller_id, true))
                .await
        }
        "!PAUSE~" => {
            fleet
                .dispatch(caller_id, selector, |s| pause(s, caller_id, false))
                .await
        }
        "!RESUME" => fleet.dispatch(caller_id, selector, |s| resume(s, caller_id)).await,
        "!START" => fleet.dispatch(caller_id, selector, |s| start(s, caller_id)).await,
        "!STATUS" => dispatch_status(fleet, caller_id, selector).await,
        "!STOP" => fleet.dispatch(caller_id, selector, |s| stop(s, caller_id)).await,
        _ => None,
    }
}

/// Line-prefix a per-session reply with the session's name
pub fn format_response(name: &str, text: &str) -> Option<String> {
    if name.is_empty() || text.is_empty() {
        error!("empty session name or response text");
        return None;
    }
    Some(format!("<{name}> {text}"))
}

async fn dispatch_status(fleet: &Arc<Fleet>, caller_id: u64, selector: &str) -> Option<String> {
    fleet
        .dispatch(caller_id, selector, |s| async move { status(s, caller_id) })
        .await
}

fn status(session: Arc<Session>, caller_id: u64) -> Option<String> {
    if session.permission_for(caller_id) < Permission::FamilySharing {
        return None;
    }

    let mut line = format!("Status: {}", session.state());
    if session.is_logged_on() && session.is_farming_paused() {
        line.push_str(", farming paused");
    }
    if session.is_playing_blocked() {
        line.push_str(", account occupied elsewhere");
    }

    format_response(session.name(), &line)
}

async fn start(session: Arc<Session>, caller_id: u64) -> Option<String> {
    if session.permission_for(caller_id) < Permission::Master {
        return None;
    }

    if session.is_running() {
        return format_response(session.name(), "Already running.");
    }

    let starting = Arc::clone(&session);
    crate::tasks::spawn_detached("command start", async move {
        starting.start().await;
    });
    format_response(session.name(), "Done.")
}

async fn stop(session: Arc<Session>, caller_id: u64) -> Option<String> {
    if session.permission_for(caller_id) < Permission::Master {
        return None;
    }

    if !session.is_running() {
        return format_response(session.name(), "Already stopped.");
    }

    session.stop().await;
    format_response(session.name(), "Done.")
}

async fn pause(session: Arc<Session>, caller_id: u64, sticky: bool) -> Option<String> {
    if session.permission_for(caller_id) < Permission::Operator {
        return None;
    }

    if !session.is_logged_on() {
        return format_response(session.name(), "Not connected.");
    }

    session.pause_farming(sticky).await;
    format_response(session.name(), "Done.")
}

async fn resume(session: Arc<Session>, caller_id: u64) -> Option<String> {
    if session.permission_for(caller_id) < Permission::Operator {
        return None;
    }

    if !session.is_logged_on() {
        return format_response(session.name(), "Not connected.");
    }

    if session.resume_farming(true).await {
        format_response(session.name(), "Done.")
    } else {
        format_response(session.name(), "Nothing to resume.")
    }
}

async fn farm(session: Arc<Session>, caller_id: u64) -> Option<String> {
    if session.permission_for(caller_id) < Permission::Master {
        return None;
    }

    if !session.is_logged_on() {
        return format_response(session.name(), "Not connected.");
    }

    session.restart_farming().await;
    format_response(session.name(), "Done.")
}

async fn loot(session: Arc<Session>, caller_id: u64) -> Option<String> {
    if session.permission_for(caller_id) < Permission::Master {
        return None;
    }

    match session.loot().await {
        Ok("done") => format_response(session.name(), "Done."),
        Ok(message) => format_response(session.name(), &format!("Not sent: {message}.")),
        Err(e) => format_response(session.name(), &format!("Failed: {e:#}.")),
    }
}

async fn two_factor_token(session: Arc<Session>, caller_id: u64) -> Option<String> {
    if session.permission_for(caller_id) < Permission::Master {
        return None;
    }

    if !session.has_authenticator() {
        return format_response(session.name(), "No authenticator configured.");
    }

    match session.generate_token().await {
        Some(token) => format_response(session.name(), &format!("One-time token: {token}")),
        None => format_response(session.name(), "Failed to generate a token."),
    }
}

async fn confirm(session: Arc<Session>, caller_id: u64, accept: bool) -> Option<String> {
    if session.permission_for(caller_id) < Permission::Master {
        return None;
    }

    if !session.has_authenticator() {
        return format_response(session.name(), "No authenticator configured.");
    }

    if !session.is_logged_on() {
        return format_response(session.name(), "Not connected.");
    }

    if session.reconcile_confirmations(accept).await {
        format_response(session.name(), "Done.")
    } else {
        format_response(session.name(), "Failed.")
    }
}

async fn api_status(fleet: &Arc<Fleet>, caller_id: u64) -> Option<String> {
    if !fleet.is_owner(caller_id) {
        return None;
    }
    Some(fleet.status_json().await)
}

fn help(session: Arc<Session>, caller_id: u64) -> Option<String> {
    if session.permission_for(caller_id) < Permission::FamilySharing {
        return None;
    }

    format_response(
        session.name(),
        "Commands: !2fa !2faok !2fano !farm !loot !pause !pause~ !resume !sa !start !status !stop !version",
    )
}

fn version(session: Arc<Session>, caller_id: u64) -> Option<String> {
    if session.permission_for(caller_id) < Permission::FamilySharing {
        return None;
    }

    format_response(
        session.name(),
        concat!("fleet-core ", env!("CARGO_PKG_VERSION")),
    )
}
