/// Role marker that row-security policies accept for end users
pub const ROLE_AUTHENTICATED: &str = "authenticated";

/// Title given to freshly created pages
pub const DEFAULT_PAGE_TITLE: &str = "Untitled";

/// Placeholder avatar used when a profile is created without one
pub const DEFAULT_AVATAR_URL: &str = "https://placehold.co/300x300";

/// Number of pages returned by a listing when the caller gives no limit
pub const DEFAULT_PAGE_LIST_LIMIT: u32 = 200;

/// Upper bound on a single page listing
pub const MAX_PAGE_LIST_LIMIT: u32 = 1000;

/// Deepest heading level a heading block may carry
pub const MAX_HEADING_LEVEL: u8 = 6;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 3000;
