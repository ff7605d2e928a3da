// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Correlation Tokens
//!
//! A correlation token is attached to every published message as its AMQP correlation
//! id. When the broker later confirms or nacks the message, the token is the only thing
//! that comes back, so it must carry both the topic and the event code.

use crate::errors::BrokerError;
use std::fmt;

/// Separates the topic from the code inside a token.
pub const CORRELATION_DELIMITER: char = ',';

/// The `(topic, code)` pair identifying a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationToken {
    pub topic: String,
    pub code: String,
}

impl CorrelationToken {
    /// Builds a token, rejecting fields that contain the delimiter.
    pub fn new(topic: &str, code: &str) -> Result<Self, BrokerError> {
        if topic.is_empty() || code.is_empty() {
            return Err(BrokerError::InvalidInputError(
                "topic and code must not be empty".to_owned(),
            ));
        }

        for field in [topic, code] {
            if field.contains(CORRELATION_DELIMITER) {
                return Err(BrokerError::InvalidInputError(format!(
                    "`{}` must not contain `{}`",
                    field, CORRELATION_DELIMITER
                )));
            }
        }

        Ok(CorrelationToken {
            topic: topic.to_owned(),
            code: code.to_owned(),
        })
    }

    pub fn encode(topic: &str, code: &str) -> Result<String, BrokerError> {
        Ok(Self::new(topic, code)?.to_string())
    }

    /// Splits a token back into its topic and code.
    pub fn decode(token: &str) -> Result<Self, BrokerError> {
        let mut fields = token.split(CORRELATION_DELIMITER);

        match (fields.next(), fields.next(), fields.next()) {
            (Some(topic), Some(code), None) if !topic.is_empty() && !code.is_empty() => {
                Ok(CorrelationToken {
                    topic: topic.to_owned(),
                    code: code.to_owned(),
                })
            }
            _ => Err(BrokerError::MalformedTokenError(token.to_owned())),
        }
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.topic, CORRELATION_DELIMITER, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_recovers_encoded_fields() {
        for (topic, code) in [
            ("orders", "42"),
            ("user.created", "2f1c-99ab"),
            ("billing:v2", "a b c"),
        ] {
            let token = CorrelationToken::encode(topic, code).unwrap();
            let decoded = CorrelationToken::decode(&token).unwrap();
            assert_eq!(decoded.topic, topic);
            assert_eq!(decoded.code, code);
        }
    }

    #[test]
    fn test_encode_format() {
        assert_eq!(CorrelationToken::encode("orders", "42").unwrap(), "orders,42");
    }

    #[test]
    fn test_encode_rejects_delimiter() {
        assert!(matches!(
            CorrelationToken::encode("a,b", "c"),
            Err(BrokerError::InvalidInputError(_))
        ));
        assert!(matches!(
            CorrelationToken::encode("a", "b,c"),
            Err(BrokerError::InvalidInputError(_))
        ));
        assert!(matches!(
            CorrelationToken::encode("", "42"),
            Err(BrokerError::InvalidInputError(_))
        ));
    }

    #[test]
    fn test_decode_rejects_malformed_tokens() {
        for token in ["onlyonefield", "", ",42", "orders,", "a,b,c"] {
            assert_eq!(
                CorrelationToken::decode(token),
                Err(BrokerError::MalformedTokenError(token.to_owned()))
            );
        }
    }
}
