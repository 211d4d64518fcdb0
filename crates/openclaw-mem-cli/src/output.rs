//! Output helpers: JSON payloads, human row rendering, receipt envelopes.

use chrono::Utc;
use serde_json::Value;

/// Print a payload: pretty JSON under `--json`, key/value or row lines
/// otherwise.
pub fn emit(payload: &Value, json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string())
        );
        return;
    }
    match payload {
        Value::Array(items) => {
            for item in items {
                print_row(item);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                match v {
                    Value::String(s) => println!("{k}: {s}"),
                    other => println!("{k}: {other}"),
                }
            }
        }
        other => println!("{other}"),
    }
}

/// Print a list of observation-shaped rows.
pub fn emit_rows(rows: &[Value], json: bool) {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&Value::Array(rows.to_vec()))
                .unwrap_or_else(|_| "[]".to_string())
        );
        return;
    }
    for row in rows {
        print_row(row);
    }
}

fn print_row(item: &Value) {
    let get = |key: &str| item.get(key).and_then(Value::as_str).unwrap_or("");
    let id = item.get("id").and_then(Value::as_i64).unwrap_or(0);
    let summary = if get("summary").is_empty() {
        get("snippet")
    } else {
        get("summary")
    };
    println!(
        "#{id} {} [{}] {} :: {}",
        get("ts"),
        get("kind"),
        get("tool_name"),
        summary
    );
}

/// Wrap a receipt payload in the versioned `openclaw-mem.<name>.v0`
/// envelope.
pub fn envelope(name: &str, mut payload: Value) -> Value {
    let kind = format!("openclaw-mem.{name}.v0");
    let ts = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let version = serde_json::json!({
        "openclaw_mem": openclaw_mem_core::VERSION,
        "schema": openclaw_mem_core::RECEIPT_SCHEMA_V0,
    });

    if let Some(obj) = payload.as_object_mut() {
        obj.insert("kind".to_string(), serde_json::json!(kind));
        obj.insert("ts".to_string(), serde_json::json!(ts));
        obj.insert("version".to_string(), version);
        return payload;
    }
    serde_json::json!({
        "kind": kind,
        "ts": ts,
        "version": version,
        "payload": payload,
    })
}

/// Report a failure with the given exit code.
pub fn fail(message: &str, json: bool, code: u8) -> anyhow::Result<u8> {
    if json {
        println!("{}", serde_json::json!({"error": message}));
    } else {
        eprintln!("error: {message}");
    }
    Ok(code)
}

/// Report a validation failure (exit 2).
pub fn fail_validation(message: &str, json: bool) -> anyhow::Result<u8> {
    fail(message, json, 2)
}
