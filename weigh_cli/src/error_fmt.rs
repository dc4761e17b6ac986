//! Human-readable error descriptions and structured JSON error formatting.

use weigh_core::SessionError;
use weigh_core::runner::NOT_SETTLED;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(se) = err.downcast_ref::<SessionError>() {
        return match se {
            SessionError::TimedOut(after) => format!(
                "What happened: No matching scale advertised within {} ms.\nLikely causes: Scale is off, out of range, or advertises a different name than the slot's target.\nHow to fix: Power the scale, move closer, check [targets] in the config, or raise scan.timeout_ms.",
                after.as_millis()
            ),
            SessionError::Scan(reason) => format!(
                "What happened: Scanning failed ({reason}).\nLikely causes: Radio switched off, missing permissions, or another scan already running.\nHow to fix: Enable the radio, grant scan permissions, then retry."
            ),
            SessionError::AlreadyScanning => "What happened: A scan is already running.\nLikely causes: A previous command is still discovering devices.\nHow to fix: Wait for it to finish or cancel it, then retry.".to_string(),
            SessionError::Connect(reason) => format!(
                "What happened: The connection to the scale failed ({reason}).\nLikely causes: Scale went out of range, powered off, or is connected to another client.\nHow to fix: Move closer, restart the scale, then run the measurement again."
            ),
            SessionError::Write(reason) => format!(
                "What happened: The scale did not accept a command ({reason}).\nLikely causes: Weak link, firmware busy, or link.write_timeout_ms too low.\nHow to fix: Retry closer to the scale or raise link.write_timeout_ms."
            ),
            SessionError::UnknownSlot(slot) => format!(
                "What happened: Slot {slot} does not exist.\nLikely causes: Typo in --slot.\nHow to fix: Use --slot 1, 2 or 3."
            ),
            SessionError::Validation(msg) => format!(
                "What happened: Invalid input ({msg}).\nLikely causes: Empty user id, separator characters in the user id, or an unknown material.\nHow to fix: Pass a plain --user and one of ALU, STEEL, PLASTIC as --material."
            ),
            SessionError::Cancelled => "What happened: The measurement was cancelled.\nLikely causes: Ctrl-C was pressed.\nHow to fix: Run the command again when ready.".to_string(),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from the driver or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains(NOT_SETTLED) {
        return format!(
            "What happened: The {msg}.\nLikely causes: Item still moving on the plate, vibrations, or stability.threshold_g too strict.\nHow to fix: Keep the item still, raise --max-wait-ms, or allow a small stability.threshold_g."
        );
    }

    if lower.contains("invalid configuration") || lower.contains("read config") {
        let cause = match err.source() {
            Some(src) => format!("{msg}: {src}"),
            None => msg.clone(),
        };
        return format!(
            "What happened: Configuration could not be loaded ({cause}).\nLikely causes: Missing file, missing [targets], or out-of-range values.\nHow to fix: Edit the TOML config (see etc/weigh.toml) and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 2 cancelled, 3 timed out, 4 scan, 5 connect/write,
/// 6 caller error, 1 anything else.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(se) = err.downcast_ref::<SessionError>() {
        return match se {
            SessionError::Cancelled => 2,
            SessionError::TimedOut(_) => 3,
            SessionError::Scan(_) | SessionError::AlreadyScanning => 4,
            SessionError::Connect(_) | SessionError::Write(_) => 5,
            SessionError::Validation(_)
            | SessionError::UnknownSlot(_)
            | SessionError::SessionBusy
            | SessionError::NotReady(_)
            | SessionError::MalformedReading(_) => 6,
        };
    }
    if err.to_string().contains(NOT_SETTLED) {
        return 3;
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = err
        .downcast_ref::<SessionError>()
        .map(SessionError::kind)
        .or_else(|| err.to_string().contains(NOT_SETTLED).then_some("not_settled"))
        .unwrap_or("error");
    json!({
        "event": "error",
        "reason": reason,
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
