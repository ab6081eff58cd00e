use broker::{ExchangeOrderId, FillEvent, FillStatus, GatewayError};
use serde_json::Value;

fn malformed(reason: impl Into<String>, payload: &Value) -> GatewayError {
    GatewayError::MalformedEvent {
        reason: reason.into(),
        payload: payload.to_string(),
    }
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Result<&'a str, GatewayError> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("missing string field '{}'", key), payload))
}

/// Decimal fields arrive as strings on the wire.
fn num_field(payload: &Value, key: &str) -> Result<f64, GatewayError> {
    str_field(payload, key)?
        .parse()
        .map_err(|_| malformed(format!("field '{}' is not a decimal", key), payload))
}

/// Translate one raw user-stream payload.
///
/// Execution reports with a filled status become a `FillEvent`; other
/// well-formed account events are skipped; anything unrecognized or
/// structurally broken is a typed error so the producer fails loudly
/// instead of silently dropping account activity.
pub fn parse_execution_report(payload: &Value) -> Result<Option<FillEvent>, GatewayError> {
    let event_type = str_field(payload, "e")?;

    match event_type {
        "executionReport" => {}
        "outboundAccountPosition" | "balanceUpdate" | "listStatus" => return Ok(None),
        "error" => {
            let message = payload
                .get("m")
                .and_then(Value::as_str)
                .unwrap_or("stream error event");
            return Err(GatewayError::Transport(message.to_string()));
        }
        other => return Err(malformed(format!("unrecognized event type '{}'", other), payload)),
    }

    let status = match str_field(payload, "X")? {
        "FILLED" => FillStatus::Filled,
        "PARTIALLY_FILLED" => FillStatus::PartiallyFilled,
        "NEW" | "CANCELED" | "REJECTED" | "EXPIRED" => return Ok(None),
        other => return Err(malformed(format!("unknown order status '{}'", other), payload)),
    };

    let exchange_order_id = payload
        .get("i")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing order id 'i'", payload))?;

    Ok(Some(FillEvent {
        exchange_order_id: ExchangeOrderId::new(exchange_order_id),
        status,
        size: num_field(payload, "l")?,
        price: num_field(payload, "L")?,
        commission: num_field(payload, "n")?,
        commission_asset: payload
            .get("N")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }))
}
