use crate::forwarder::{ForwardMessage, TunnelMessage};
use colored::{ColoredString, Colorize};
use once_cell::sync::Lazy;
use serde_json::json;
use std::net::SocketAddr;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

static TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");

/// Resolved once at first use; determining the local offset is not reliable
/// after other threads have started.
static LOCAL_OFFSET: Lazy<UtcOffset> =
    Lazy::new(|| UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC));

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .to_offset(*LOCAL_OFFSET)
        .format(TIMESTAMP_FORMAT)
        .unwrap_or_default()
}

/// Print one observer event. Without `verbose` only lifecycle and error
/// events appear; `verbose` adds the data events with payload previews.
pub fn print_message(message: &ForwardMessage, verbose: bool) {
    let ts = timestamp();
    match message {
        ForwardMessage::Accept { peer, blocked } => {
            println!(
                "[{}] {}: {}",
                ts.green(),
                "Connection Accepted".green(),
                peer.to_string().blue()
            );
            if *blocked {
                println!("  {}", "Connection is blocked by rules".red());
            }
        }
        ForwardMessage::AcceptError { error } => {
            println!(
                "[{}] {}: {}",
                ts.red(),
                "Accept Error".red(),
                error.to_string().red()
            );
        }
        ForwardMessage::Error { error } => {
            println!(
                "[{}] {}: {}",
                ts.red(),
                "Common Error".red(),
                error.to_string().red()
            );
        }
        ForwardMessage::Tunnel { peer, message } => {
            print_tunnel_message(&ts, *peer, message, verbose)
        }
    }
}

fn print_tunnel_message(ts: &str, peer: SocketAddr, message: &TunnelMessage, verbose: bool) {
    let peer = peer.to_string();
    match message {
        TunnelMessage::InputRead { data } => {
            if verbose {
                println!(
                    "[{}] {}: {} | {}",
                    ts.cyan(),
                    "Read from input".cyan(),
                    peer.blue(),
                    format_data(data)
                );
            }
        }
        TunnelMessage::InputReadError { error } => {
            println!(
                "[{}] {}: {} | {}",
                ts.red(),
                "Read from input Error".red(),
                peer.blue(),
                error.to_string().red()
            );
        }
        TunnelMessage::WriteToInputOk { output, data } => {
            if verbose {
                println!(
                    "[{}] {}: {} <- {} | {} bytes",
                    ts.cyan(),
                    "Write to input OK".cyan(),
                    peer.blue(),
                    output.address().yellow(),
                    data.len()
                );
            }
        }
        TunnelMessage::WriteToInputError { output, error } => {
            println!(
                "[{}] {}: {} -> {} | {}",
                ts.red(),
                "Write to input Error".red(),
                peer.blue(),
                output.address().yellow(),
                error.to_string().red()
            );
        }
        TunnelMessage::OutputRead { output, data } => {
            if verbose {
                println!(
                    "[{}] {}: {} | {}",
                    ts.magenta(),
                    "Read from output".magenta(),
                    output.address().yellow(),
                    format_data(data)
                );
            }
        }
        TunnelMessage::OutputReadError { output, error } => {
            println!(
                "[{}] {}: {} <- {} | {}",
                ts.red(),
                "Read from output Error".red(),
                peer.blue(),
                output.address().yellow(),
                error.to_string().red()
            );
        }
        TunnelMessage::WriteToOutputOk { output, data } => {
            if verbose {
                println!(
                    "[{}] {}: {} -> {} | {} bytes",
                    ts.magenta(),
                    "Write to output OK".magenta(),
                    peer.blue(),
                    output.address().yellow(),
                    data.len()
                );
            }
        }
        TunnelMessage::WriteToOutputError { output, error } => {
            println!(
                "[{}] {}: {} <- {} | {}",
                ts.red(),
                "Write to output Error".red(),
                peer.blue(),
                output.address().yellow(),
                error.to_string().red()
            );
        }
        TunnelMessage::TunnelClosed { closed_by_output } => {
            println!(
                "[{}] {}: {} by {}",
                ts.yellow(),
                "Tunnel closed".yellow(),
                peer.blue(),
                closed_by(*closed_by_output)
            );
        }
    }
}

fn closed_by(by_output: bool) -> ColoredString {
    if by_output {
        "output".yellow()
    } else {
        "input".blue()
    }
}

/// Quote a payload for display, eliding the middle of long chunks.
fn format_data(data: &[u8]) -> String {
    if data.len() <= 100 {
        return format!("{:?}", String::from_utf8_lossy(data));
    }
    format!(
        "{:?} ... {:?}",
        String::from_utf8_lossy(&data[..50]),
        String::from_utf8_lossy(&data[data.len() - 50..])
    )
}

/// Print one observer event as a JSON line, for piping into tooling.
pub fn print_json(message: &ForwardMessage) {
    let ts = timestamp();
    let record = match message {
        ForwardMessage::Accept { peer, blocked } => json!({
            "ts": ts, "event": "accept", "peer": peer.to_string(), "blocked": blocked,
        }),
        ForwardMessage::AcceptError { error } => json!({
            "ts": ts, "event": "accept_error", "error": error.to_string(),
        }),
        ForwardMessage::Error { error } => json!({
            "ts": ts, "event": "error", "error": error.to_string(),
        }),
        ForwardMessage::Tunnel { peer, message } => {
            let peer = peer.to_string();
            match message {
                TunnelMessage::InputRead { data } => json!({
                    "ts": ts, "event": "input_read", "peer": peer, "bytes": data.len(),
                }),
                TunnelMessage::InputReadError { error } => json!({
                    "ts": ts, "event": "input_read_error", "peer": peer,
                    "error": error.to_string(),
                }),
                TunnelMessage::WriteToInputOk { output, data } => json!({
                    "ts": ts, "event": "write_to_input_ok", "peer": peer,
                    "output": output.address(), "bytes": data.len(),
                }),
                TunnelMessage::WriteToInputError { output, error } => json!({
                    "ts": ts, "event": "write_to_input_error", "peer": peer,
                    "output": output.address(), "error": error.to_string(),
                }),
                TunnelMessage::OutputRead { output, data } => json!({
                    "ts": ts, "event": "output_read", "peer": peer,
                    "output": output.address(), "bytes": data.len(),
                }),
                TunnelMessage::OutputReadError { output, error } => json!({
                    "ts": ts, "event": "output_read_error", "peer": peer,
                    "output": output.address(), "error": error.to_string(),
                }),
                TunnelMessage::WriteToOutputOk { output, data } => json!({
                    "ts": ts, "event": "write_to_output_ok", "peer": peer,
                    "output": output.address(), "bytes": data.len(),
                }),
                TunnelMessage::WriteToOutputError { output, error } => json!({
                    "ts": ts, "event": "write_to_output_error", "peer": peer,
                    "output": output.address(), "error": error.to_string(),
                }),
                TunnelMessage::TunnelClosed { closed_by_output } => json!({
                    "ts": ts, "event": "tunnel_closed", "peer": peer,
                    "closed_by": if *closed_by_output { "output" } else { "input" },
                }),
            }
        }
    };
    println!("{}", record);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_data_short() {
        assert_eq!(format_data(b"hello"), "\"hello\"");
    }

    #[test]
    fn test_format_data_elides_long_payloads() {
        let data = vec![b'x'; 200];
        let formatted = format_data(&data);
        assert!(formatted.contains(" ... "));
        assert!(formatted.len() < 200);
    }
}
