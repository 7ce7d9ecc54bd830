//! `toolcast emit` -- deliver one envelope over the fallback path.
//!
//! Unlike the broadcaster, which fires and forgets, this awaits the POST and
//! reports its outcome, which makes it handy for poking a relay by hand.
//!
//! # Examples
//!
//! ```text
//! toolcast emit --type EXECUTING --tool-id quiz_1 --session s1
//! toolcast emit --type completed --tool-id quiz_1 --tool-type quiz --payload score=8 --payload passed=true
//! ```

use clap::Args;
use clap::builder::NonEmptyStringValueParser;
use toolcast_channels::{FallbackRequest, FallbackTransport, HttpFallback};
use toolcast_types::{
    EnvelopeMeta, EventPayload, PayloadValue, ToolEventEnvelope, ToolEventType, ToolcastConfig,
    create_envelope,
};
use tracing::info;

/// Arguments for the `emit` subcommand.
#[derive(Debug, Args)]
pub struct EmitArgs {
    /// Lifecycle kind (e.g. PROPOSED, COMPLETED; case-insensitive).
    #[arg(long = "type", value_parser = parse_event_type)]
    pub event_type: ToolEventType,

    /// Tool instance id.
    #[arg(long, value_parser = NonEmptyStringValueParser::new())]
    pub tool_id: String,

    /// Session id (defaults to `session.sessionId` from config).
    #[arg(long)]
    pub session: Option<String>,

    /// Tool kind.
    #[arg(long)]
    pub tool_type: Option<String>,

    /// Payload field as key=value; repeatable.
    #[arg(long, value_parser = parse_payload_field)]
    pub payload: Vec<(String, PayloadValue)>,
}

fn parse_event_type(raw: &str) -> Result<ToolEventType, String> {
    ToolEventType::parse(&raw.to_ascii_uppercase()).ok_or_else(|| {
        let known: Vec<&str> = ToolEventType::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown event type '{raw}' (expected one of {})", known.join(", "))
    })
}

/// Split `key=value`, reading booleans and numbers as such.
fn parse_payload_field(raw: &str) -> Result<(String, PayloadValue), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }

    let value = match value {
        "true" => PayloadValue::from(true),
        "false" => PayloadValue::from(false),
        v => match (v.parse::<i64>(), v.parse::<f64>()) {
            (Ok(n), _) => PayloadValue::from(n),
            (_, Ok(f)) => PayloadValue::try_from(f).unwrap_or_else(|_| PayloadValue::from(v)),
            _ => PayloadValue::from(v),
        },
    };
    Ok((key.to_string(), value))
}

/// Build the envelope described by `args`.
pub fn build_envelope(args: &EmitArgs, session_id: Option<String>) -> ToolEventEnvelope {
    let payload = (!args.payload.is_empty()).then(|| EventPayload::fields(args.payload.iter().cloned()));
    create_envelope(
        args.event_type,
        args.tool_id.as_str(),
        payload,
        EnvelopeMeta {
            tool_type: args.tool_type.clone(),
            session_id,
            maestro_id: None,
        },
    )
}

/// Run the `emit` subcommand.
pub async fn run(args: EmitArgs, config: &ToolcastConfig) -> anyhow::Result<()> {
    let session_id = args.session.clone().or_else(|| config.session.session_id.clone());
    let envelope = build_envelope(&args, session_id.clone());

    let transport = HttpFallback::from_config(&config.fallback);
    let endpoint = transport.endpoint().to_string();
    transport
        .deliver(FallbackRequest {
            event: envelope,
            session_id,
        })
        .await?;

    info!(%endpoint, tool_id = %args.tool_id, "envelope delivered");
    println!("delivered {} {} to {endpoint}", args.event_type, args.tool_id);
    Ok(())
}
