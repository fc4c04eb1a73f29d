//! Tushare Pro wire format.
//!
//! Every endpoint answers with the same envelope:
//!
//! ```json
//! {"code": 0, "msg": "", "data": {"fields": ["ts_code", "close"], "items": [["600000.SH", 7.5]]}}
//! ```

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tsdata_core::{ApiRequest, DataError, Result};

/// Status code Tushare uses for "too many requests".
pub const RATE_LIMIT_CODE: i64 = 40203;

/// JSON body posted to the API.
#[derive(Debug, Serialize)]
pub(crate) struct RequestBody<'a> {
    pub(crate) api_name: &'a str,
    pub(crate) token: &'a str,
    pub(crate) params: &'a BTreeMap<String, String>,
    pub(crate) fields: String,
}

impl<'a> RequestBody<'a> {
    pub(crate) fn new(request: &'a ApiRequest, token: &'a str) -> Self {
        Self {
            api_name: &request.api_name,
            token,
            params: &request.params,
            fields: request.fields.join(","),
        }
    }
}

/// Response envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct Response {
    pub(crate) code: i64,
    #[serde(default)]
    pub(crate) msg: Option<String>,
    #[serde(default)]
    pub(crate) data: Option<Payload>,
}

/// Column-major table payload.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct Payload {
    #[serde(default)]
    pub(crate) fields: Vec<String>,
    #[serde(default)]
    pub(crate) items: Vec<Vec<Value>>,
}

impl Response {
    /// Convert the envelope into a frame, mapping non-zero codes to errors.
    pub(crate) fn into_frame(self, provider: &str) -> Result<DataFrame> {
        match self.code {
            0 => {
                let payload = self.data.unwrap_or_default();
                frame_from_items(&payload.fields, &payload.items)
            }
            RATE_LIMIT_CODE => Err(DataError::RateLimited {
                provider: provider.to_string(),
                retry_after: None,
            }),
            code => Err(DataError::Api {
                code,
                message: self.msg.unwrap_or_default(),
            }),
        }
    }
}

/// Build a frame from Tushare's `fields` / `items` arrays.
///
/// Columns whose non-null values are all JSON numbers become `Float64`; every
/// other column becomes `String`.
pub(crate) fn frame_from_items(fields: &[String], items: &[Vec<Value>]) -> Result<DataFrame> {
    let columns = fields
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let cells: Vec<&Value> = items
                .iter()
                .map(|row| row.get(i).unwrap_or(&Value::Null))
                .collect();
            build_column(name, &cells)
        })
        .collect();

    DataFrame::new(columns).map_err(|e| DataError::Parse(e.to_string()))
}

fn build_column(name: &str, cells: &[&Value]) -> Column {
    let numeric = cells.iter().any(|v| v.is_number())
        && cells.iter().all(|v| v.is_number() || v.is_null());

    if numeric {
        let values: Vec<Option<f64>> = cells.iter().map(|v| v.as_f64()).collect();
        Column::new(name.into(), values)
    } else {
        let values: Vec<Option<String>> = cells
            .iter()
            .map(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                other => Some(other.to_string()),
            })
            .collect();
        Column::new(name.into(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let request = ApiRequest::new("daily")
            .param("ts_code", "600000.SH")
            .fields(["trade_date", "close"]);
        let body = serde_json::to_value(RequestBody::new(&request, "token")).unwrap();

        assert_eq!(
            body,
            json!({
                "api_name": "daily",
                "token": "token",
                "params": {"ts_code": "600000.SH"},
                "fields": "trade_date,close"
            })
        );
    }

    #[test]
    fn test_frame_from_items_infers_types() {
        let response: Response = serde_json::from_value(json!({
            "code": 0,
            "msg": "",
            "data": {
                "fields": ["ts_code", "trade_date", "close", "note"],
                "items": [
                    ["600000.SH", "20240102", 7.5, null],
                    ["600000.SH", "20240103", 7, "x"],
                    ["600000.SH", "20240104", null]
                ]
            }
        }))
        .unwrap();

        let df = response.into_frame("Tushare").unwrap();
        assert_eq!(df.shape(), (3, 4));
        assert_eq!(df.column("trade_date").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("close").unwrap().dtype(), &DataType::Float64);
        assert_eq!(df.column("close").unwrap().f64().unwrap().get(1), Some(7.0));
        assert_eq!(df.column("note").unwrap().null_count(), 2);
    }

    #[test]
    fn test_error_codes() {
        let limited: Response =
            serde_json::from_value(json!({"code": 40203, "msg": "too many requests"})).unwrap();
        assert!(matches!(
            limited.into_frame("Tushare"),
            Err(DataError::RateLimited { .. })
        ));

        let denied: Response =
            serde_json::from_value(json!({"code": 2002, "msg": "no permission", "data": null}))
                .unwrap();
        match denied.into_frame("Tushare") {
            Err(DataError::Api { code, message }) => {
                assert_eq!(code, 2002);
                assert_eq!(message, "no permission");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_data_is_empty_frame() {
        let response: Response = serde_json::from_value(json!({"code": 0})).unwrap();
        let df = response.into_frame("Tushare").unwrap();
        assert_eq!(df.shape(), (0, 0));
    }
}
