pub mod table_const {
    pub const ACCOUNT_TABLE: &str = "users";
    pub const LIST_TABLE: &str = "lists";
    pub const LIST_MEMBER_TABLE: &str = "list_members";
    pub const TASK_TABLE: &str = "tasks";
    pub const INVITATION_TABLE: &str = "invitations";
    pub const NOTIFICATION_TABLE: &str = "notifications";
    pub const SUBSCRIPTION_TABLE: &str = "user_subscriptions";
}

pub mod invite_const {
    pub const INVITATION_TTL_DAYS: i64 = 7;
    pub const INVITATION_TOKEN_LEN: usize = 32;
    pub const ACCEPT_INVITE_PATH: &str = "/accept-invite";
}

pub mod route_const {
    /// Page prefixes that need a live session.
    pub const PROTECTED_ROUTES: [&str; 4] = ["/dashboard", "/list", "/pro", "/settings"];
    pub const AUTH_PREFIX: &str = "/auth";
    pub const LOGIN_PATH: &str = "/auth/login";
    pub const DASHBOARD_PATH: &str = "/dashboard";
    pub const SESSION_COOKIE: &str = "session";
}

pub mod session_const {
    pub const SESSION_TTL_DAYS: i64 = 7;
    pub const JWT_ISSUER: &str = "sharelist";
}

pub mod webhook_const {
    pub const SIGNATURE_HEADER: &str = "stripe-signature";
    pub const SIGNATURE_TOLERANCE_SECS: u64 = 300;
}
