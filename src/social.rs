use regex::Regex;
use serde::Serialize;

/// Public RSSHub instance used when no local bridge is configured.
pub const DEFAULT_RSSHUB_BASE: &str = "https://rsshub.app";

/// Supported platforms, with the capture pattern for the username part of
/// a profile URL.
const PLATFORMS: &[(&str, &str)] = &[
    ("instagram", r"instagram\.com/([^/?#]+)"),
    ("youtube", r"youtube\.com/(?:channel/|c/|@)?([^/?#]+)"),
    ("github", r"github\.com/([^/?#]+)"),
    ("twitter", r"twitter\.com/([^/?#]+)"),
    // Anchored so hosts merely ending in x.com do not match
    ("x", r"[/.]x\.com/([^/?#]+)"),
    ("tiktok", r"tiktok\.com/@([^/?#]+)"),
    ("bilibili", r"bilibili\.com/video/([^/?#]+)"),
    ("weibo", r"weibo\.com/u/([^/?#]+)"),
    ("zhihu", r"zhihu\.com/people/([^/?#]+)"),
    ("pixiv", r"pixiv\.net/users/([^/?#]+)"),
    ("reddit", r"reddit\.com/r/([^/?#]+)"),
];

#[derive(Debug, Clone, Serialize)]
pub struct RouteSuggestion {
    pub url: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct SocialAnalysis {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub suggestions: Vec<RouteSuggestion>,
}

#[derive(Debug, Serialize)]
pub struct PlatformInfo {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub example_url: &'static str,
}

pub fn detect_platform(url: &str) -> Option<&'static str> {
    let lower = url.to_lowercase();
    PLATFORMS
        .iter()
        .find(|(_, pattern)| {
            Regex::new(pattern)
                .expect("platform pattern is valid")
                .is_match(&lower)
        })
        .map(|(key, _)| *key)
}

pub fn extract_username(url: &str, platform: &str) -> Option<String> {
    let (_, pattern) = PLATFORMS.iter().find(|(key, _)| *key == platform)?;
    let regex = Regex::new(pattern).expect("platform pattern is valid");
    regex
        .captures(&url.to_lowercase())
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

/// Candidate RSSHub feeds for a platform/username pair.
pub fn rsshub_routes(base: &str, platform: &str, username: &str) -> Vec<RouteSuggestion> {
    let route = |path: String, title: String, description: &str| RouteSuggestion {
        url: format!("{base}{path}"),
        title,
        description: description.to_string(),
    };

    match platform {
        "instagram" => vec![route(
            format!("/instagram/user/{username}"),
            format!("@{username} - Instagram Posts"),
            "Recent posts from user's profile",
        )],
        "twitter" | "x" => vec![
            route(
                format!("/twitter/user/{username}"),
                format!("@{username} - Twitter/X Posts"),
                "User timeline tweets",
            ),
            route(
                format!("/twitter/user/{username}/media"),
                format!("@{username} - Twitter/X Media"),
                "Media posts only",
            ),
        ],
        "youtube" => {
            // 24-character UC ids are channel ids, everything else is a
            // username or custom URL
            let path = if username.starts_with("uc") && username.len() == 24 {
                format!("/youtube/channel/{username}")
            } else {
                format!("/youtube/user/{username}")
            };
            vec![route(
                path,
                format!("{username} - YouTube Channel"),
                "Latest videos from channel",
            )]
        }
        "github" => vec![
            route(
                format!("/github/user/repo/{username}"),
                format!("{username} - GitHub Repositories"),
                "New repositories and updates",
            ),
            route(
                format!("/github/user/followers/{username}"),
                format!("{username} - GitHub Followers"),
                "New followers",
            ),
        ],
        "tiktok" => vec![route(
            format!("/tiktok/user/{username}"),
            format!("@{username} - TikTok Posts"),
            "Recent TikTok videos",
        )],
        "bilibili" => vec![
            route(
                format!("/bilibili/user/video/{username}"),
                format!("{username} - Bilibili Videos"),
                "Latest videos from user",
            ),
            route(
                format!("/bilibili/user/dynamic/{username}"),
                format!("{username} - Bilibili Dynamics"),
                "User dynamics and updates",
            ),
        ],
        "weibo" => vec![route(
            format!("/weibo/user/{username}"),
            format!("{username} - Weibo Posts"),
            "Recent Weibo posts",
        )],
        "zhihu" => vec![
            route(
                format!("/zhihu/people/activities/{username}"),
                format!("{username} - Zhihu Activities"),
                "User activities and posts",
            ),
            route(
                format!("/zhihu/people/answers/{username}"),
                format!("{username} - Zhihu Answers"),
                "User answers to questions",
            ),
        ],
        "pixiv" => vec![route(
            format!("/pixiv/user/{username}"),
            format!("{username} - Pixiv Artworks"),
            "Latest artworks from user",
        )],
        "reddit" => vec![route(
            format!("/reddit/r/{username}"),
            format!("r/{username} - Reddit"),
            "Latest posts from subreddit",
        )],
        _ => Vec::new(),
    }
}

/// Validates a social profile URL and proposes RSSHub feeds for it.
pub fn analyze_url(base: &str, url: &str) -> SocialAnalysis {
    let invalid = |error: &str| SocialAnalysis {
        valid: false,
        platform: None,
        username: None,
        error: Some(error.to_string()),
        suggestions: Vec::new(),
    };

    let Ok(parsed) = url::Url::parse(url) else {
        return invalid("Invalid URL format");
    };
    if parsed.host_str().is_none() {
        return invalid("Invalid URL format");
    }

    let Some(platform) = detect_platform(url) else {
        return invalid("Unsupported social media platform");
    };

    let Some(username) = extract_username(url, platform) else {
        return invalid("Could not extract username/identifier");
    };

    let suggestions = rsshub_routes(base, platform, &username);

    SocialAnalysis {
        valid: true,
        platform: Some(platform.to_string()),
        username: Some(username),
        error: None,
        suggestions,
    }
}

pub fn platform_list() -> Vec<PlatformInfo> {
    vec![
        PlatformInfo {
            key: "instagram",
            name: "Instagram",
            description: "User posts and tagged content",
            example_url: "https://instagram.com/username",
        },
        PlatformInfo {
            key: "twitter",
            name: "Twitter/X",
            description: "Tweets, media, and timeline",
            example_url: "https://twitter.com/username",
        },
        PlatformInfo {
            key: "youtube",
            name: "YouTube",
            description: "Channel videos and playlists",
            example_url: "https://youtube.com/channel/UC...",
        },
        PlatformInfo {
            key: "github",
            name: "GitHub",
            description: "Repositories, releases, and activity",
            example_url: "https://github.com/username",
        },
        PlatformInfo {
            key: "tiktok",
            name: "TikTok",
            description: "User videos and posts",
            example_url: "https://tiktok.com/@username",
        },
        PlatformInfo {
            key: "bilibili",
            name: "Bilibili",
            description: "Videos and user dynamics",
            example_url: "https://bilibili.com/video/...",
        },
        PlatformInfo {
            key: "weibo",
            name: "Weibo",
            description: "Chinese microblogging platform",
            example_url: "https://weibo.com/u/...",
        },
        PlatformInfo {
            key: "zhihu",
            name: "Zhihu",
            description: "Chinese Q&A platform",
            example_url: "https://zhihu.com/people/username",
        },
        PlatformInfo {
            key: "pixiv",
            name: "Pixiv",
            description: "Artwork sharing platform",
            example_url: "https://pixiv.net/users/...",
        },
        PlatformInfo {
            key: "reddit",
            name: "Reddit",
            description: "Discussion forums and communities",
            example_url: "https://reddit.com/r/subreddit",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_known_platforms() {
        assert_eq!(
            detect_platform("https://github.com/rust-lang"),
            Some("github")
        );
        assert_eq!(
            detect_platform("https://www.youtube.com/@somechannel"),
            Some("youtube")
        );
        assert_eq!(
            detect_platform("https://tiktok.com/@dancer"),
            Some("tiktok")
        );
        assert_eq!(detect_platform("https://x.com/someone"), Some("x"));
        assert_eq!(detect_platform("https://example.com/blog"), None);
    }

    #[test]
    fn test_x_detection_requires_host_boundary() {
        assert_eq!(detect_platform("https://box.com/someone"), None);
    }

    #[test]
    fn test_extract_username() {
        assert_eq!(
            extract_username("https://github.com/rust-lang", "github").as_deref(),
            Some("rust-lang")
        );
        assert_eq!(
            extract_username("https://tiktok.com/@dancer?lang=en", "tiktok").as_deref(),
            Some("dancer")
        );
        assert_eq!(extract_username("https://example.com/x", "github"), None);
    }

    #[test]
    fn test_youtube_channel_id_route() {
        let routes = rsshub_routes(
            DEFAULT_RSSHUB_BASE,
            "youtube",
            "ucxo1nx9lfwyhkjp6oqqzz2q",
        );
        assert_eq!(routes.len(), 1);
        assert!(routes[0].url.contains("/youtube/channel/"));

        let routes = rsshub_routes(DEFAULT_RSSHUB_BASE, "youtube", "somecreator");
        assert!(routes[0].url.contains("/youtube/user/"));
    }

    #[test]
    fn test_x_shares_twitter_routes() {
        let twitter = rsshub_routes(DEFAULT_RSSHUB_BASE, "twitter", "someone");
        let x = rsshub_routes(DEFAULT_RSSHUB_BASE, "x", "someone");
        assert_eq!(twitter.len(), 2);
        assert_eq!(twitter[0].url, x[0].url);
    }

    #[test]
    fn test_analyze_valid_url() {
        let analysis = analyze_url(DEFAULT_RSSHUB_BASE, "https://github.com/rust-lang");
        assert!(analysis.valid);
        assert_eq!(analysis.platform.as_deref(), Some("github"));
        assert_eq!(analysis.username.as_deref(), Some("rust-lang"));
        assert_eq!(analysis.suggestions.len(), 2);
        assert!(analysis.error.is_none());
    }

    #[test]
    fn test_analyze_rejects_malformed_url() {
        let analysis = analyze_url(DEFAULT_RSSHUB_BASE, "not a url");
        assert!(!analysis.valid);
        assert_eq!(analysis.error.as_deref(), Some("Invalid URL format"));
        assert!(analysis.suggestions.is_empty());
    }

    #[test]
    fn test_analyze_rejects_unknown_platform() {
        let analysis = analyze_url(DEFAULT_RSSHUB_BASE, "https://example.com/person");
        assert!(!analysis.valid);
        assert_eq!(
            analysis.error.as_deref(),
            Some("Unsupported social media platform")
        );
    }

    #[test]
    fn test_platform_list_covers_patterns() {
        let keys: Vec<&str> = platform_list().iter().map(|p| p.key).collect();
        // Every listed platform has a detection pattern ("x" rides on the
        // twitter listing)
        for key in keys {
            assert!(PLATFORMS.iter().any(|(k, _)| *k == key), "missing {key}");
        }
    }
}
