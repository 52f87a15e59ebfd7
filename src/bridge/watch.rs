use std::sync::Arc;

use serde_json::{json, Value};

use crate::bridge::error::{parse_error, BridgeResult};
use crate::bridge::events::{BridgeEvent, EventSink};
use crate::platform::spawn_detached;
use crate::remote::{ChangeStream, ObjectId, WatchSpec};
use crate::util::{json_eval_value, stringify};

/// Subscription request as submitted by the host. The discriminant replaces
/// runtime shape-sniffing for native callers; `Json` remains for hosts that
/// can only pass text across the embedding boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum WatchArgument {
    /// JSON text, parsed once and then interpreted (see [`normalize`]).
    Json(String),
    /// Watch exactly these documents, given as opaque identifier strings.
    Ids(Vec<String>),
    /// Watch every document matching this filter.
    Filter(Value),
}

/// Reduces any accepted argument shape to its canonical [`WatchSpec`].
///
/// The `Json` form keeps the historical boundary contract: a two-element
/// sequence is read as `[candidate-id-list, toggle]`: toggle `false` means
/// element 0 is used directly as the match-filter, anything else means every
/// entry of element 0 is an identifier string. Any other parsed shape passes
/// through unchanged as a raw filter.
pub fn normalize(argument: WatchArgument) -> BridgeResult<WatchSpec> {
    match argument {
        WatchArgument::Ids(ids) => ids_to_spec(&ids),
        WatchArgument::Filter(filter) => Ok(WatchSpec::Filter(filter)),
        WatchArgument::Json(text) => {
            let value = json_eval_value(&text)
                .map_err(|err| parse_error(format!("malformed watch argument: {err}")))?;
            interpret(value)
        }
    }
}

fn interpret(value: Value) -> BridgeResult<WatchSpec> {
    match value {
        Value::Array(items) if items.len() == 2 => {
            let mut items = items;
            let toggle = items.pop().filter(|toggle| toggle != &Value::Bool(false));
            let head = items.pop().unwrap_or(Value::Null);
            match toggle {
                None => Ok(WatchSpec::Filter(head)),
                Some(_) => match head {
                    Value::Array(entries) => {
                        let ids = entries
                            .iter()
                            .map(|entry| {
                                entry.as_str().ok_or_else(|| {
                                    parse_error(format!(
                                        "watch identifier list entries must be strings, got {entry}"
                                    ))
                                })
                            })
                            .collect::<BridgeResult<Vec<_>>>()?;
                        ids_to_spec(&ids)
                    }
                    other => Err(parse_error(format!(
                        "watch identifier list must be an array, got {other}"
                    ))),
                },
            }
        }
        other => Ok(WatchSpec::Filter(other)),
    }
}

fn ids_to_spec(ids: &[impl AsRef<str>]) -> BridgeResult<WatchSpec> {
    ids.iter()
        .map(|id| {
            ObjectId::parse_str(id.as_ref())
                .map_err(|err| parse_error(format!("invalid watch identifier: {err}")))
        })
        .collect::<BridgeResult<Vec<_>>>()
        .map(WatchSpec::Ids)
}

/// Handle to one open change subscription. Dropping the handle leaves the
/// stream running (fire-and-forget setups never keep it); call
/// [`WatchSubscription::close`] to tear the stream down.
#[derive(Debug)]
pub struct WatchSubscription {
    database: String,
    collection: String,
    stream: ChangeStream,
}

impl WatchSubscription {
    pub(crate) fn new(database: &str, collection: &str, stream: ChangeStream) -> Self {
        Self {
            database: database.to_string(),
            collection: collection.to_string(),
            stream,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    /// Stops the subscription; the pump drains already-delivered events and
    /// exits.
    pub fn close(&self) {
        self.stream.close();
    }
}

/// Forwards every change event to the sink, narrowed to the changed
/// document's identifier. Runs until the stream closes.
pub(crate) fn spawn_pump(
    database: String,
    collection: String,
    stream: ChangeStream,
    sink: Arc<dyn EventSink>,
) {
    spawn_detached(async move {
        while let Ok(event) = stream.recv().await {
            let payload = match stringify(&json!({ "_id": event.document_key })) {
                Ok(payload) => payload,
                Err(err) => {
                    log::warn!("dropping change event for {database}.{collection}: {err}");
                    continue;
                }
            };
            sink.emit(&BridgeEvent::WatchEvent {
                database: database.clone(),
                collection: collection.clone(),
                payload,
            });
        }
        log::debug!("change stream for {database}.{collection} ended");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::error::BridgeErrorCode;

    #[test]
    fn identifier_list_with_true_toggle_becomes_identifier_set() {
        let spec = normalize(WatchArgument::Json(
            r#"[["507f1f77bcf86cd799439011","507f191e810c19729de860ea"], true]"#.into(),
        ))
        .unwrap();
        let WatchSpec::Ids(ids) = spec else {
            panic!("expected identifier set, got {spec:?}");
        };
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].to_hex(), "507f1f77bcf86cd799439011");
        assert_eq!(ids[1].to_hex(), "507f191e810c19729de860ea");
    }

    #[test]
    fn false_toggle_uses_first_element_as_filter() {
        let spec = normalize(WatchArgument::Json(
            r#"[{"status":"open"}, false]"#.into(),
        ))
        .unwrap();
        assert_eq!(spec, WatchSpec::Filter(serde_json::json!({"status":"open"})));
    }

    #[test]
    fn bare_object_passes_through_unchanged() {
        let spec = normalize(WatchArgument::Json(r#"{"status":"open"}"#.into())).unwrap();
        assert_eq!(spec, WatchSpec::Filter(serde_json::json!({"status":"open"})));
    }

    #[test]
    fn non_false_toggle_is_treated_as_identifier_request() {
        // Anything other than literal `false` selects the identifier path.
        let spec = normalize(WatchArgument::Json(
            r#"[["507f1f77bcf86cd799439011"], "yes"]"#.into(),
        ))
        .unwrap();
        assert!(matches!(spec, WatchSpec::Ids(ids) if ids.len() == 1));
    }

    #[test]
    fn three_element_arrays_are_raw_filters() {
        let spec = normalize(WatchArgument::Json(r#"[1, 2, 3]"#.into())).unwrap();
        assert_eq!(spec, WatchSpec::Filter(serde_json::json!([1, 2, 3])));
    }

    #[test]
    fn malformed_json_is_a_parse_failure() {
        let err = normalize(WatchArgument::Json("{not json".into())).unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::Parse);
    }

    #[test]
    fn non_string_identifier_entries_are_rejected() {
        let err = normalize(WatchArgument::Json(r#"[[1, 2], true]"#.into())).unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::Parse);
    }

    #[test]
    fn malformed_identifier_strings_are_rejected() {
        let err = normalize(WatchArgument::Ids(vec!["short".into()])).unwrap_err();
        assert_eq!(err.code, BridgeErrorCode::Parse);
    }

    #[test]
    fn explicit_filter_variant_is_canonical_already() {
        let filter = serde_json::json!({"owner": "me"});
        assert_eq!(
            normalize(WatchArgument::Filter(filter.clone())).unwrap(),
            WatchSpec::Filter(filter)
        );
    }
}
