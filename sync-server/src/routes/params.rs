//! Protocol parameters, taken from the query string and, for POST requests,
//! from an urlencoded form body.

use crate::error::AppError;
use axum::extract::{FromRequest, Query, Request};
use axum::http::{header, Method};
use axum::Form;
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Default)]
pub struct ProtocolParams(HashMap<String, String>);

impl ProtocolParams {
    pub fn required(&self, name: &str) -> Result<&str, AppError> {
        self.0
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AppError::missing_parameter(name))
    }

    pub fn optional(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn parsed<T: FromStr>(&self, name: &str) -> Result<Option<T>, AppError> {
        self.optional(name)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| AppError::BadRequest(format!("Invalid value for parameter: {}", name)))
            })
            .transpose()
    }
}

impl<S> FromRequest<S> for ProtocolParams
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Query(mut params) = Query::<HashMap<String, String>>::try_from_uri(req.uri())
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

        if req.method() == Method::POST && is_form {
            let Form(body) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
            params.extend(body);
        }

        Ok(Self(params))
    }
}

#[cfg(test)]
impl ProtocolParams {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_and_parsed() {
        let params = ProtocolParams::from_pairs(&[("token", "t"), ("offset", "12"), ("length", "x")]);
        assert_eq!(params.required("token").unwrap(), "t");
        match params.required("resource") {
            Err(AppError::Unprocessable(m)) => assert_eq!(m, "Missing required parameter: resource"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(params.parsed::<u64>("offset").unwrap(), Some(12));
        assert_eq!(params.parsed::<u64>("missing").unwrap(), None);
        assert!(matches!(params.parsed::<u64>("length"), Err(AppError::BadRequest(_))));
    }
}
