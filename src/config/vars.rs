//! Environment variable names read by the lanes.

// Android release
pub const ANDROID_KEYSTORE_BASE64: &str = "ANDROID_KEYSTORE_BASE64";
pub const ANDROID_KEYSTORE_PATH: &str = "ANDROID_KEYSTORE_PATH";
pub const ANDROID_KEYSTORE_PASSWORD: &str = "ANDROID_KEYSTORE_PASSWORD";
pub const ANDROID_KEY_ALIAS: &str = "ANDROID_KEY_ALIAS";
pub const ANDROID_KEY_PASSWORD: &str = "ANDROID_KEY_PASSWORD";
pub const GOOGLE_PLAY_SERVICE_ACCOUNT_JSON: &str = "GOOGLE_PLAY_SERVICE_ACCOUNT_JSON";

// iOS release
pub const APP_STORE_CONNECT_API_KEY_ID: &str = "APP_STORE_CONNECT_API_KEY_ID";
pub const APP_STORE_CONNECT_ISSUER_ID: &str = "APP_STORE_CONNECT_ISSUER_ID";
pub const APP_STORE_CONNECT_API_KEY: &str = "APP_STORE_CONNECT_API_KEY";

// iOS centralized signing (all optional)
pub const MATCH_DEPLOY_KEY: &str = "MATCH_DEPLOY_KEY";
pub const MATCH_PASSWORD: &str = "MATCH_PASSWORD";
pub const MATCH_GIT_URL: &str = "MATCH_GIT_URL";
pub const APPLE_ID: &str = "APPLE_ID";
pub const APPLE_TEAM_ID: &str = "APPLE_TEAM_ID";
pub const ITC_TEAM_ID: &str = "ITC_TEAM_ID";

// Common
pub const CI: &str = "CI";
pub const GITHUB_RUN_NUMBER: &str = "GITHUB_RUN_NUMBER";

/// Either keystore source satisfies the requirement.
pub const ANDROID_KEYSTORE_SOURCE: &str = "ANDROID_KEYSTORE_BASE64 or ANDROID_KEYSTORE_PATH";
