//! Interpreters available to `code_block` nodes

/// How to run one source language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Language {
    /// Canonical name reported by [`Language::names`]
    pub name: &'static str,
    /// Interpreter executable, resolved through `PATH`
    pub command: &'static str,
    /// Extension of the scratch source file
    pub extension: &'static str,
    /// Arguments placed before the source path
    pub args: &'static [&'static str],
    aliases: &'static [&'static str],
}

const LANGUAGES: &[Language] = &[
    Language {
        name: "python",
        command: "python3",
        extension: "py",
        args: &["-I"],
        aliases: &["python3", "py"],
    },
    Language {
        name: "javascript",
        command: "node",
        extension: "js",
        args: &[],
        aliases: &["js", "node", "nodejs"],
    },
    Language {
        name: "bash",
        command: "bash",
        extension: "sh",
        args: &[],
        aliases: &[],
    },
    Language {
        name: "sh",
        command: "sh",
        extension: "sh",
        args: &[],
        aliases: &["shell"],
    },
    Language {
        name: "ruby",
        command: "ruby",
        extension: "rb",
        args: &[],
        aliases: &["rb"],
    },
    Language {
        name: "perl",
        command: "perl",
        extension: "pl",
        args: &[],
        aliases: &["pl"],
    },
    Language {
        name: "php",
        command: "php",
        extension: "php",
        args: &[],
        aliases: &[],
    },
];

impl Language {
    /// Look a language up by name or alias, ignoring case
    pub fn find(name: &str) -> Option<&'static Language> {
        let name = name.trim().to_ascii_lowercase();
        LANGUAGES
            .iter()
            .find(|lang| lang.name == name || lang.aliases.contains(&name.as_str()))
    }

    pub fn names() -> Vec<String> {
        LANGUAGES.iter().map(|lang| lang.name.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_alias() {
        assert_eq!(Language::find("Python3").unwrap().command, "python3");
        assert_eq!(Language::find("js").unwrap().name, "javascript");
        assert!(Language::find("cobol").is_none());
        assert_eq!(Language::names().len(), LANGUAGES.len());
    }
}
