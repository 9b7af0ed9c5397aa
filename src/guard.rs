//! Navigation guard over `(authenticated, route kind)`.
//!
//! | session | route           | outcome                                   |
//! |---------|-----------------|-------------------------------------------|
//! | none    | protected       | login, `redirect` = original path + query |
//! | none    | `/accept-invite`| login, token kept for post-login replay   |
//! | live    | `/auth/*`       | dashboard                                 |
//! | any     | anything else   | pass                                      |

use url::form_urlencoded;

use crate::consts::{
    invite_const::ACCEPT_INVITE_PATH,
    route_const::{AUTH_PREFIX, DASHBOARD_PATH, LOGIN_PATH, PROTECTED_ROUTES},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Pass,
    Redirect(String),
}

fn under(path: &str, prefix: &str) -> bool {
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub fn is_protected(path: &str) -> bool {
    PROTECTED_ROUTES.iter().any(|route| under(path, route))
}

pub fn is_auth_page(path: &str) -> bool {
    under(path, AUTH_PREFIX)
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

pub fn decide(path: &str, query: Option<&str>, authenticated: bool) -> GuardDecision {
    if is_auth_page(path) {
        return if authenticated {
            GuardDecision::Redirect(DASHBOARD_PATH.to_string())
        } else {
            GuardDecision::Pass
        };
    }

    if authenticated {
        return GuardDecision::Pass;
    }

    if path == ACCEPT_INVITE_PATH {
        return match query_param(query, "token") {
            Some(token) => GuardDecision::Redirect(format!(
                "{LOGIN_PATH}?redirect={ACCEPT_INVITE_PATH}&token={}",
                encode(&token)
            )),
            None => GuardDecision::Pass,
        };
    }

    if is_protected(path) {
        let original = match query {
            Some(q) if !q.is_empty() => format!("{path}?{q}"),
            _ => path.to_string(),
        };
        return GuardDecision::Redirect(format!("{LOGIN_PATH}?redirect={}", encode(&original)));
    }

    GuardDecision::Pass
}

/// Where to land after a successful login. Only local paths are honoured.
pub fn post_login_destination(redirect: Option<&str>, token: Option<&str>) -> String {
    let Some(redirect) = redirect.filter(|r| {
        r.starts_with('/') && !r.starts_with("//") && !r.contains('\\')
    }) else {
        return DASHBOARD_PATH.to_string();
    };

    match token {
        Some(token) if !token.is_empty() => {
            let sep = if redirect.contains('?') { '&' } else { '?' };
            format!("{redirect}{sep}token={}", encode(token))
        }
        _ => redirect.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_route_without_session_goes_to_login() {
        assert_eq!(
            decide("/list/L1", Some("tab=done"), false),
            GuardDecision::Redirect("/auth/login?redirect=%2Flist%2FL1%3Ftab%3Ddone".into())
        );
        assert_eq!(
            decide("/dashboard", None, false),
            GuardDecision::Redirect("/auth/login?redirect=%2Fdashboard".into())
        );
    }

    #[test]
    fn test_auth_page_with_session_goes_to_dashboard() {
        assert_eq!(
            decide("/auth/login", None, true),
            GuardDecision::Redirect("/dashboard".into())
        );
        assert_eq!(decide("/auth/login", None, false), GuardDecision::Pass);
    }

    #[test]
    fn test_everything_else_passes() {
        assert_eq!(decide("/dashboard", None, true), GuardDecision::Pass);
        assert_eq!(decide("/invitation/abc", None, false), GuardDecision::Pass);
        assert_eq!(decide("/listing", None, false), GuardDecision::Pass);
        assert_eq!(decide("/authors", None, true), GuardDecision::Pass);
    }

    #[test]
    fn test_accept_invite_keeps_token_for_replay() {
        assert_eq!(
            decide("/accept-invite", Some("token=T"), false),
            GuardDecision::Redirect("/auth/login?redirect=/accept-invite&token=T".into())
        );
        assert_eq!(decide("/accept-invite", Some("token=T"), true), GuardDecision::Pass);
    }

    #[test]
    fn test_post_login_destination() {
        assert_eq!(
            post_login_destination(Some("/accept-invite"), Some("T")),
            "/accept-invite?token=T"
        );
        assert_eq!(post_login_destination(Some("/list/L1"), None), "/list/L1");
        assert_eq!(
            post_login_destination(Some("https://evil.example"), None),
            "/dashboard"
        );
        assert_eq!(post_login_destination(Some("//evil.example"), None), "/dashboard");
        assert_eq!(post_login_destination(None, Some("T")), "/dashboard");
    }
}
