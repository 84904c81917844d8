//! Shared classification tables: the tech-stack allow-list, tag normalization
//! and the AI-tool domain list used to tell tools apart from articles.

use crate::ResourceType;

/// Maximum number of free-form tags suggested for one resource.
pub const MAX_TAGS: usize = 10;

/// Topics that map onto the tech-stack field instead of free-form tags.
pub const TECH_STACK: &[&str] = &[
    "angular",
    "astro",
    "aws",
    "azure",
    "bun",
    "c",
    "cpp",
    "csharp",
    "css",
    "dart",
    "deno",
    "django",
    "docker",
    "dotnet",
    "elixir",
    "express",
    "fastapi",
    "firebase",
    "flask",
    "flutter",
    "gcp",
    "go",
    "graphql",
    "html",
    "java",
    "javascript",
    "kotlin",
    "kubernetes",
    "laravel",
    "mongodb",
    "mysql",
    "nestjs",
    "nextjs",
    "nodejs",
    "nuxt",
    "php",
    "postgresql",
    "python",
    "pytorch",
    "rails",
    "react",
    "react-native",
    "redis",
    "ruby",
    "rust",
    "scala",
    "spring",
    "sql",
    "svelte",
    "swift",
    "tailwindcss",
    "tensorflow",
    "terraform",
    "typescript",
    "vue",
];

/// Spelling variants folded onto a [`TECH_STACK`] entry.
const TECH_ALIASES: &[(&str, &str)] = &[
    ("c++", "cpp"),
    ("c#", "csharp"),
    ("golang", "go"),
    ("js", "javascript"),
    ("ts", "typescript"),
    ("node", "nodejs"),
    ("node.js", "nodejs"),
    ("next", "nextjs"),
    ("next.js", "nextjs"),
    ("nuxtjs", "nuxt"),
    ("vuejs", "vue"),
    ("vue.js", "vue"),
    ("reactjs", "react"),
    ("react.js", "react"),
    ("reactnative", "react-native"),
    ("postgres", "postgresql"),
    ("k8s", "kubernetes"),
    ("tailwind", "tailwindcss"),
    ("jupyter notebook", "python"),
    ("ruby on rails", "rails"),
    ("rubyonrails", "rails"),
];

/// Domains whose pages are products rather than articles.
pub const AI_TOOL_DOMAINS: &[&str] = &[
    "openai.com",
    "chatgpt.com",
    "anthropic.com",
    "claude.ai",
    "huggingface.co",
    "replicate.com",
    "midjourney.com",
    "perplexity.ai",
    "cursor.com",
    "cursor.sh",
    "v0.dev",
    "bolt.new",
    "lovable.dev",
    "gemini.google.com",
    "copilot.microsoft.com",
    "github.com/features/copilot",
    "mistral.ai",
    "cohere.com",
    "stability.ai",
    "runwayml.com",
    "elevenlabs.io",
    "ollama.com",
    "langchain.com",
    "tabnine.com",
    "codeium.com",
    "phind.com",
];

/// Lower-cases, trims and strips a leading `#`. Empty input yields `None`.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let tag = raw.trim().trim_start_matches('#').trim().to_lowercase();
    if tag.is_empty() {
        None
    } else {
        Some(tag)
    }
}

/// Maps a tag, topic or language name onto the tech allow-list.
pub fn tech_for(raw: &str) -> Option<&'static str> {
    let tag = normalize_tag(raw)?;
    let canonical = TECH_ALIASES
        .iter()
        .find(|(alias, _)| *alias == tag)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(tag.as_str());

    TECH_STACK.iter().copied().find(|t| *t == canonical)
}

/// Normalizes a repository language as reported by GitHub. Languages outside the
/// allow-list are kept verbatim in lower case.
pub fn normalize_language(language: &str) -> Option<String> {
    match tech_for(language) {
        Some(tech) => Some(tech.to_string()),
        None => normalize_tag(language),
    }
}

/// Pushes `value` unless an equal entry is already present.
pub fn push_unique(target: &mut Vec<String>, value: String) {
    if !target.iter().any(|existing| *existing == value) {
        target.push(value);
    }
}

/// Splits raw tags into `(tags, tech_stack)`: allow-listed entries land in the
/// tech stack, the rest become free-form tags capped at [`MAX_TAGS`].
pub fn partition_tags<I, S>(raw: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags = Vec::new();
    let mut tech = Vec::new();

    for item in raw {
        if let Some(t) = tech_for(item.as_ref()) {
            push_unique(&mut tech, t.to_string());
        } else if let Some(tag) = normalize_tag(item.as_ref()) {
            if tags.len() < MAX_TAGS {
                push_unique(&mut tags, tag);
            }
        }
    }

    (tags, tech)
}

/// Deduplicated, normalized tags capped at [`MAX_TAGS`].
pub fn dedupe_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags = Vec::new();
    for item in raw {
        if tags.len() >= MAX_TAGS {
            break;
        }
        if let Some(tag) = normalize_tag(item.as_ref()) {
            push_unique(&mut tags, tag);
        }
    }
    tags
}

/// Scans free text for allow-listed technology words.
pub fn tech_in_text(text: &str) -> Vec<String> {
    let mut tech = Vec::new();
    for word in text
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '|' | '(' | ')' | ':' | '!' | '?'))
        .filter(|w| !w.is_empty())
    {
        // single letters like "c" or "go" in prose are too noisy
        if word.len() < 3 && !word.eq_ignore_ascii_case("ts") && !word.eq_ignore_ascii_case("js") {
            continue;
        }
        if let Some(t) = tech_for(word.trim_end_matches('.')) {
            push_unique(&mut tech, t.to_string());
        }
    }
    tech
}

/// Classifies a generic page by where it lives.
pub fn classify_domain(host: &str, path: &str) -> ResourceType {
    let host = host.trim_start_matches("www.").to_ascii_lowercase();
    let full = format!("{host}{path}");

    let is_tool = AI_TOOL_DOMAINS.iter().any(|domain| match domain.split_once('/') {
        Some(_) => full.starts_with(domain),
        None => host == *domain || host.ends_with(&format!(".{domain}")),
    });

    if is_tool {
        ResourceType::Tool
    } else {
        ResourceType::Blog
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tech_aliases() {
        assert_eq!(tech_for("React"), Some("react"));
        assert_eq!(tech_for("#reactjs"), Some("react"));
        assert_eq!(tech_for("C++"), Some("cpp"));
        assert_eq!(tech_for("Jupyter Notebook"), Some("python"));
        assert_eq!(tech_for("ui"), None);
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("JavaScript").as_deref(), Some("javascript"));
        assert_eq!(normalize_language("C#").as_deref(), Some("csharp"));
        assert_eq!(normalize_language("Zig").as_deref(), Some("zig"));
        assert_eq!(normalize_language("  "), None);
    }

    #[test]
    fn test_partition_tags_caps_free_tags() {
        let raw: Vec<String> = (0..15)
            .map(|i| format!("topic-{i}"))
            .chain(["docker".to_string(), "vue".to_string(), "Docker".to_string()])
            .collect();
        let (tags, tech) = partition_tags(raw);

        assert_eq!(tags.len(), MAX_TAGS);
        assert_eq!(tags[0], "topic-0");
        assert_eq!(tech, vec!["docker", "vue"]);
    }

    #[test]
    fn test_dedupe_tags() {
        let tags = dedupe_tags(["Rust", "rust", " #WebDev ", ""]);
        assert_eq!(tags, vec!["rust", "webdev"]);
    }

    #[test]
    fn test_tech_in_text() {
        let tech = tech_in_text("Building a Next.js app with TypeScript and Docker");
        assert_eq!(tech, vec!["nextjs", "typescript", "docker"]);
        assert!(tech_in_text("Let's go to the park").is_empty());
    }

    #[test]
    fn test_classify_domain() {
        assert_eq!(classify_domain("www.perplexity.ai", "/"), ResourceType::Tool);
        assert_eq!(classify_domain("platform.openai.com", "/docs"), ResourceType::Tool);
        assert_eq!(
            classify_domain("github.com", "/features/copilot"),
            ResourceType::Tool
        );
        assert_eq!(classify_domain("github.com", "/rust-lang"), ResourceType::Blog);
        assert_eq!(classify_domain("blog.rust-lang.org", "/"), ResourceType::Blog);
    }
}
