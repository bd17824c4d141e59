//! 事件输出格式

use colored::{ColoredString, Colorize};
use transit_session::SessionEvent;

/// One coloured line per event: `[cp] connection  control plane connected`
pub fn render_event(event: &SessionEvent) -> String {
    let tag = format!("[{}]", event.channel().as_str()).dimmed();
    format!("{} {} {}", tag, label(event), detail(event))
}

fn label(event: &SessionEvent) -> ColoredString {
    let name = event.name();
    match event {
        SessionEvent::Connected { .. }
        | SessionEvent::Authenticated { .. }
        | SessionEvent::ConfigUpdated { .. } => name.green().bold(),
        SessionEvent::ConnectionClosed { .. } | SessionEvent::MalformedMessage { .. } => {
            name.yellow().bold()
        }
        SessionEvent::ConnectionFailed { .. }
        | SessionEvent::ConnectionError { .. }
        | SessionEvent::AuthFailed { .. }
        | SessionEvent::SendError { .. }
        | SessionEvent::ConfigRejected { .. } => name.red().bold(),
        SessionEvent::ControlPlaneMessage(_) | SessionEvent::AppBridgeMessage(_) => {
            name.cyan().bold()
        }
        SessionEvent::Command(_) => name.magenta().bold(),
    }
}

fn detail(event: &SessionEvent) -> String {
    match event {
        SessionEvent::ControlPlaneMessage(envelope) | SessionEvent::AppBridgeMessage(envelope) => {
            envelope
                .to_json()
                .unwrap_or_else(|_| envelope.t.clone())
        }
        SessionEvent::Command(command) => {
            format!("args={} dto={}", command.args, command.dto)
        }
        other => other.to_string(),
    }
}
