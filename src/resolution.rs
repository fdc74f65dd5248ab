use tracing::warn;

/// Output frame size. Every supported token is 16:9.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub token: String,
    pub width: u32,
    pub height: u32,
}

const RESOLUTIONS: &[(&str, u32, u32)] = &[
    ("720", 1280, 720),
    ("720p", 1280, 720),
    ("1080", 1920, 1080),
    ("1080p", 1920, 1080),
    ("1440", 2560, 1440),
    ("1440p", 2560, 1440),
];

pub const DEFAULT_TOKEN: &str = "720";

/// Map a resolution token to a pixel size. Unknown tokens fall back to 1280x720.
pub fn resolve(token: &str) -> Resolution {
    match RESOLUTIONS.iter().find(|(t, _, _)| *t == token) {
        Some(&(_, width, height)) => Resolution {
            token: token.to_string(),
            width,
            height,
        },
        None => {
            warn!(
                "Unknown resolution '{}'; falling back to {}x{}",
                token, 1280, 720
            );
            Resolution {
                token: DEFAULT_TOKEN.to_string(),
                width: 1280,
                height: 720,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tokens_map_to_documented_sizes() {
        let expected = [
            ("720", 1280, 720),
            ("720p", 1280, 720),
            ("1080", 1920, 1080),
            ("1080p", 1920, 1080),
            ("1440", 2560, 1440),
            ("1440p", 2560, 1440),
        ];
        for (token, w, h) in expected {
            let r = resolve(token);
            assert_eq!((r.width, r.height), (w, h), "token {token}");
            assert_eq!(r.token, token);
            assert_eq!(r.width * 9, r.height * 16);
        }
    }

    #[test]
    fn unknown_token_falls_back_to_720p() {
        for token in ["4k", "", "1080P", " 720", "480"] {
            let r = resolve(token);
            assert_eq!((r.width, r.height), (1280, 720), "token {token:?}");
        }
    }
}
