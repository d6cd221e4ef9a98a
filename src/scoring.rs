use crate::model::{PredictionError, Predictor};
use crate::store::{PassengerRecord, RecordStore, StoreError};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    #[error("request body must be a JSON object")]
    InvalidBody,
    #[error("missing required field {0}")]
    MissingField(String),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreOutcome {
    pub id: String,
    pub prediction: f64,
}

/// Scores one passenger and stores the result under its id.
///
/// A failed write after a successful prediction is returned as an error;
/// the caller never sees a prediction that was not persisted.
pub async fn score(
    predictor: &dyn Predictor,
    store: &dyn RecordStore,
    body: Option<&str>,
) -> Result<ScoreOutcome, ScoreError> {
    let input = parse_body(body)?;
    let id = passenger_id(&input)?;
    let features = ordered_features(&input, predictor.feature_names())?;

    let probability = predictor.predict_probability(&features)?;
    let prediction = Decimal::try_from(probability)
        .map_err(|_| PredictionError::NonFinite)?
        .normalize();

    let record = PassengerRecord { id: id.clone(), features: Value::Object(input), prediction };
    if let Err(e) = store.put(&record).await {
        tracing::error!(
            id = %id,
            prediction = probability,
            error = %e,
            "prediction computed but not persisted"
        );
        return Err(e.into());
    }

    let prediction = prediction.to_f64().unwrap_or(probability);
    Ok(ScoreOutcome { id, prediction })
}

fn parse_body(body: Option<&str>) -> Result<Map<String, Value>, ScoreError> {
    match body.map(serde_json::from_str::<Value>) {
        Some(Ok(Value::Object(input))) => Ok(input),
        _ => Err(ScoreError::InvalidBody),
    }
}

fn passenger_id(input: &Map<String, Value>) -> Result<String, ScoreError> {
    match input.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ScoreError::MissingField("id".into())),
    }
}

/// Pulls the values in the order the model declares; the first absent name fails the request.
pub fn ordered_features(
    input: &Map<String, Value>,
    names: &[String],
) -> Result<Vec<f64>, ScoreError> {
    names
        .iter()
        .map(|name| match input.get(name) {
            None | Some(Value::Null) => Err(ScoreError::MissingField(name.clone())),
            Some(value) => numeric(value).ok_or_else(|| {
                ScoreError::Prediction(PredictionError::NonNumeric { field: name.clone() })
            }),
        })
        .collect()
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|x| x.is_finite()),
        _ => None,
    }
}
