use std::future::Future;

pub const SLUG_MIN_LEN: usize = 3;
pub const SLUG_MAX_LEN: usize = 48;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

pub const RESERVED_SLUGS: &[&str] = &[
    "admin",
    "api",
    "app",
    "auth",
    "billing",
    "dashboard",
    "docs",
    "help",
    "login",
    "logout",
    "settings",
    "signup",
    "support",
    "static",
    "status",
    "system",
    "www",
    "invite",
    "invites",
    "register",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugValidation {
    pub valid: bool,
    pub reason: Option<String>,
}

impl SlugValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SlugError<E> {
    #[error("Invalid slug base '{base}': {reason}")]
    Invalid { base: String, reason: String },

    #[error("No available slug for '{base}' after {attempts} attempts")]
    Exhausted { base: String, attempts: u32 },

    #[error("Slug lookup failed: {0}")]
    Lookup(E),
}

pub fn validate(slug: &str) -> SlugValidation {
    let len = slug.chars().count();
    if len < SLUG_MIN_LEN || len > SLUG_MAX_LEN {
        return SlugValidation::rejected(format!(
            "Slug must be between {} and {} characters",
            SLUG_MIN_LEN, SLUG_MAX_LEN
        ));
    }

    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return SlugValidation::rejected(
            "Slug may only contain lowercase letters, digits and hyphens",
        );
    }

    if slug.starts_with('-') || slug.ends_with('-') {
        return SlugValidation::rejected("Slug cannot start or end with a hyphen");
    }

    if RESERVED_SLUGS.contains(&slug) {
        return SlugValidation::rejected("Slug is reserved");
    }

    SlugValidation::ok()
}

/// Lowercase, collapse every non-alphanumeric run into one hyphen, trim, cap at 48.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    out.truncate(SLUG_MAX_LEN);
    out.trim_matches('-').to_string()
}

/// `base` for attempt 1, `base-N` for attempt N, base truncated to fit 48 chars.
pub fn candidate(base: &str, attempt: u32) -> String {
    if attempt <= 1 {
        return truncate_chars(base, SLUG_MAX_LEN).to_string();
    }

    let suffix = format!("-{}", attempt);
    let keep = SLUG_MAX_LEN.saturating_sub(suffix.len());
    let head = truncate_chars(base, keep).trim_end_matches('-');
    format!("{}{}", head, suffix)
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Validate `base`, then probe `base`, `base-2`, `base-3`, ... until `exists` reports a free one.
pub async fn assign_available<F, Fut, E>(
    base: &str,
    mut exists: F,
    max_attempts: u32,
) -> Result<String, SlugError<E>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let checked = validate(base);
    if !checked.valid {
        return Err(SlugError::Invalid {
            base: base.to_string(),
            reason: checked.reason.unwrap_or_default(),
        });
    }

    for attempt in 1..=max_attempts {
        let slug = candidate(base, attempt);
        if !exists(slug.clone()).await.map_err(SlugError::Lookup)? {
            return Ok(slug);
        }
    }

    Err(SlugError::Exhausted {
        base: base.to_string(),
        attempts: max_attempts,
    })
}
