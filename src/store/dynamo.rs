use super::{PassengerRecord, RecordStore, ScanPage, StoreError};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::str::FromStr;

type Item = HashMap<String, AttributeValue>;

const KEY: &str = "id";

pub struct DynamoStore {
    client: Client,
    table: String,
}

impl DynamoStore {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        DynamoStore { client, table: table.into() }
    }
}

fn unavailable<E: std::error::Error>(operation: &'static str) -> impl FnOnce(E) -> StoreError {
    move |e| StoreError::Unavailable { operation, message: DisplayErrorContext(e).to_string() }
}

#[async_trait]
impl RecordStore for DynamoStore {
    async fn get(&self, id: &str) -> Result<Option<PassengerRecord>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key(KEY, AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(unavailable("GetItem"))?;

        output.item().map(item_to_record).transpose()
    }

    async fn put(&self, record: &PassengerRecord) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(record_to_item(record)))
            .send()
            .await
            .map_err(unavailable("PutItem"))?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<Option<PassengerRecord>, StoreError> {
        let output = self
            .client
            .delete_item()
            .table_name(&self.table)
            .key(KEY, AttributeValue::S(id.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(unavailable("DeleteItem"))?;

        // ALL_OLD comes back empty when the key did not exist
        match output.attributes() {
            Some(old) if !old.is_empty() => item_to_record(old).map(Some),
            _ => Ok(None),
        }
    }

    async fn scan_page(&self, cursor: Option<String>) -> Result<ScanPage, StoreError> {
        let start_key =
            cursor.map(|id| HashMap::from([(KEY.to_string(), AttributeValue::S(id))]));
        let output = self
            .client
            .scan()
            .table_name(&self.table)
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(unavailable("Scan"))?;

        let records =
            output.items().iter().map(item_to_record).collect::<Result<Vec<_>, _>>()?;
        let next = match output.last_evaluated_key().and_then(|key| key.get(KEY)) {
            Some(AttributeValue::S(id)) => Some(id.clone()),
            Some(_) => {
                return Err(StoreError::Decode {
                    id: String::new(),
                    message: "continuation key is not a string id".into(),
                })
            }
            None => None,
        };
        tracing::debug!(count = records.len(), more = next.is_some(), "scanned page");
        Ok(ScanPage { records, next })
    }
}

pub(crate) fn record_to_item(record: &PassengerRecord) -> Item {
    HashMap::from([
        (KEY.to_string(), AttributeValue::S(record.id.clone())),
        ("features".to_string(), json_to_attribute(&record.features)),
        ("prediction".to_string(), AttributeValue::N(record.prediction.to_string())),
    ])
}

pub(crate) fn item_to_record(item: &Item) -> Result<PassengerRecord, StoreError> {
    let id = match item.get(KEY) {
        Some(AttributeValue::S(id)) => id.clone(),
        _ => {
            return Err(StoreError::Decode {
                id: String::new(),
                message: "missing string id".into(),
            })
        }
    };
    let decode = |message: String| StoreError::Decode { id: id.clone(), message };

    let features = match item.get("features") {
        Some(attr) => attribute_to_json(attr).map_err(decode)?,
        None => Value::Null,
    };
    // Only the prediction is kept as an exact decimal
    let prediction = match item.get("prediction") {
        Some(AttributeValue::N(n)) => parse_decimal(n).map_err(decode)?,
        _ => return Err(decode("missing numeric prediction".into())),
    };

    Ok(PassengerRecord { id, features, prediction })
}

fn json_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attribute).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter().map(|(k, v)| (k.clone(), json_to_attribute(v))).collect(),
        ),
    }
}

// Feature numbers go out as plain floats, whatever their magnitude
fn attribute_to_json(attr: &AttributeValue) -> Result<Value, String> {
    Ok(match attr {
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => {
            let float =
                n.trim().parse::<f64>().map_err(|e| format!("{n} is not a number: {e}"))?;
            Number::from_f64(float)
                .map(Value::Number)
                .ok_or_else(|| format!("{n} is not finite"))?
        }
        AttributeValue::L(items) => {
            Value::Array(items.iter().map(attribute_to_json).collect::<Result<_, _>>()?)
        }
        AttributeValue::M(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), attribute_to_json(v)?)))
                .collect::<Result<Map<_, _>, String>>()?,
        ),
        other => return Err(format!("unsupported attribute type {other:?}")),
    })
}

fn parse_decimal(text: &str) -> Result<Decimal, String> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .map_err(|e| format!("{text} is not a decimal: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::operation::get_item::GetItemOutput;
    use aws_sdk_dynamodb::operation::scan::ScanOutput;
    use aws_smithy_mocks::{mock, mock_client};
    use serde_json::json;

    fn scored() -> PassengerRecord {
        PassengerRecord {
            id: "1".into(),
            features: json!({
                "id": "1", "Age": 22, "Fare": 7.25, "Sex_male": true,
                "cabin": null, "tags": ["a", 2]
            }),
            prediction: Decimal::from_str("0.0871").unwrap(),
        }
    }

    fn scored_as(id: &str) -> Item {
        record_to_item(&PassengerRecord { id: id.into(), ..scored() })
    }

    fn key(id: &str) -> Item {
        HashMap::from([(KEY.to_string(), AttributeValue::S(id.into()))])
    }

    #[test]
    fn record_maps_to_native_item() {
        let item = record_to_item(&scored());

        assert_eq!(item["id"], AttributeValue::S("1".into()));
        assert_eq!(item["prediction"], AttributeValue::N("0.0871".into()));
        let AttributeValue::M(features) = &item["features"] else {
            panic!("features must be a map")
        };
        assert_eq!(features["Age"], AttributeValue::N("22".into()));
        assert_eq!(features["Sex_male"], AttributeValue::Bool(true));
        assert_eq!(features["cabin"], AttributeValue::Null(true));
        assert_eq!(
            features["tags"],
            AttributeValue::L(vec![AttributeValue::S("a".into()), AttributeValue::N("2".into())])
        );
    }

    #[test]
    fn numbers_read_back_as_floats() {
        let record = item_to_record(&record_to_item(&scored())).unwrap();

        assert_eq!(record.prediction, Decimal::from_str("0.0871").unwrap());
        assert!(record.features["Age"].is_f64());
        assert_eq!(record.features["Age"], json!(22.0));
        assert_eq!(record.features["Fare"], json!(7.25));
        assert_eq!(record.features["tags"], json!(["a", 2.0]));
    }

    #[test]
    fn features_beyond_decimal_range_read_back() {
        let record = PassengerRecord {
            features: json!({ "id": "big", "Fare": 1e30, "Age": 1e-40 }),
            id: "big".into(),
            ..scored()
        };

        let stored = item_to_record(&record_to_item(&record)).unwrap();
        assert_eq!(stored.features["Fare"], json!(1e30));
        assert_eq!(stored.features["Age"], json!(1e-40));
    }

    #[test]
    fn item_without_prediction_is_malformed() {
        let mut item = record_to_item(&scored());
        item.remove("prediction");
        assert!(matches!(
            item_to_record(&item),
            Err(StoreError::Decode { ref id, .. }) if id == "1"
        ));
    }

    #[test]
    fn set_attributes_are_rejected() {
        let mut item = record_to_item(&scored());
        item.insert("features".into(), AttributeValue::Ss(vec!["x".into()]));
        assert!(item_to_record(&item).is_err());
    }

    #[test]
    fn scientific_notation_is_accepted() {
        assert_eq!(parse_decimal("1E-3").unwrap(), Decimal::from_str("0.001").unwrap());
    }

    #[tokio::test]
    async fn scan_follows_last_evaluated_key() {
        let first = mock!(aws_sdk_dynamodb::Client::scan)
            .match_requests(|req| req.exclusive_start_key().is_none())
            .then_output(|| {
                ScanOutput::builder()
                    .set_items(Some(vec![scored_as("a"), scored_as("b")]))
                    .set_last_evaluated_key(Some(key("b")))
                    .build()
            });
        let second = mock!(aws_sdk_dynamodb::Client::scan)
            .match_requests(|req| req.exclusive_start_key() == Some(&key("b")))
            .then_output(|| ScanOutput::builder().set_items(Some(vec![scored_as("c")])).build());
        let store = DynamoStore::new(mock_client!(aws_sdk_dynamodb, [&first, &second]), "t");

        let page = store.scan_page(None).await.unwrap();
        assert_eq!(page.next.as_deref(), Some("b"));
        assert_eq!(page.records.len(), 2);

        let page = store.scan_page(page.next).await.unwrap();
        assert_eq!(page.next, None);
        assert_eq!(page.records[0].id, "c");
    }

    #[tokio::test]
    async fn scan_rejects_non_string_continuation_key() {
        let rule = mock!(aws_sdk_dynamodb::Client::scan).then_output(|| {
            ScanOutput::builder()
                .set_last_evaluated_key(Some(HashMap::from([(
                    KEY.to_string(),
                    AttributeValue::N("7".into()),
                )])))
                .build()
        });
        let store = DynamoStore::new(mock_client!(aws_sdk_dynamodb, [&rule]), "t");

        assert!(matches!(store.scan_page(None).await, Err(StoreError::Decode { .. })));
    }

    #[tokio::test]
    async fn get_decodes_item_and_reports_absence() {
        let found = mock!(aws_sdk_dynamodb::Client::get_item)
            .match_requests(|req| {
                req.key().and_then(|k| k.get(KEY)) == Some(&AttributeValue::S("1".into()))
            })
            .then_output(|| {
                GetItemOutput::builder().set_item(Some(record_to_item(&scored()))).build()
            });
        let missing = mock!(aws_sdk_dynamodb::Client::get_item)
            .then_output(|| GetItemOutput::builder().build());
        let store = DynamoStore::new(mock_client!(aws_sdk_dynamodb, [&found, &missing]), "t");

        assert_eq!(store.get("1").await.unwrap().map(|r| r.id), Some("1".to_string()));
        assert!(store.get("2").await.unwrap().is_none());
    }
}
