// Caller identity. Token verification happens upstream; this service only
// turns the verified identity into a `Principal`.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use odyssey_common::{OdysseyError, Result};
use odyssey_grading::{Principal, Role};
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Principal>;
}

/// Trusts the identity headers set by the fronting gateway
#[derive(Debug, Default, Clone, Copy)]
pub struct GatewayAuth;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl AuthProvider for GatewayAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Principal> {
        let user_id = header(headers, USER_ID_HEADER)
            .ok_or_else(|| OdysseyError::Unauthorized("Missing user identity".to_string()))?;
        let role = header(headers, USER_ROLE_HEADER)
            .ok_or_else(|| OdysseyError::Unauthorized("Missing user role".to_string()))?
            .parse::<Role>()
            .map_err(|e| OdysseyError::Unauthorized(e.to_string()))?;

        Ok(Principal::new(user_id, role))
    }
}

/// Extractor for handlers that require a caller
pub struct Authenticated(pub Principal);

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> std::result::Result<Self, Self::Rejection> {
        let principal = state.auth.authenticate(&parts.headers)?;
        // Admin-assigned roles win over the forwarded one
        let principal = state.platform.roles.resolve(principal).await?;
        Ok(Authenticated(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_gateway_headers() {
        let principal = GatewayAuth
            .authenticate(&headers(&[(USER_ID_HEADER, "u1"), (USER_ROLE_HEADER, "instructor")]))
            .unwrap();
        assert_eq!(principal, Principal::new("u1", Role::Instructor));
    }

    #[test]
    fn test_missing_or_unknown_identity_is_unauthorized() {
        for pairs in [
            vec![],
            vec![(USER_ID_HEADER, "u1")],
            vec![(USER_ID_HEADER, " "), (USER_ROLE_HEADER, "STUDENT")],
            vec![(USER_ID_HEADER, "u1"), (USER_ROLE_HEADER, "MODERATOR")],
        ] {
            let err = GatewayAuth.authenticate(&headers(&pairs)).unwrap_err();
            assert!(matches!(err, OdysseyError::Unauthorized(_)), "{:?}", pairs);
        }
    }
}
