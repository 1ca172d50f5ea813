use std::path::Path;

use crate::config::PatternRule;
use crate::guard::normalize_path;

/// 未命中任何规则时的分类
pub const DEFAULT_LABEL: &str = "General folder";

/// 内置分类表，按优先级排列，先匹配者胜出
pub const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    ("node_modules", "Node.js packages"),
    ("__pycache__", "Python cache"),
    (".pip", "Python pip cache"),
    (".conda", "Conda packages"),
    (".npm", "NPM cache"),
    ("appdata/local/temp", "Temporary files"),
    ("downloads", "Downloads folder"),
    ("windows/temp", "Windows temp files"),
];

/// 基于有序子串表的路径分类器
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    patterns: Vec<(String, String)>,
}

impl Default for PatternClassifier {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PatternClassifier {
    pub fn with_defaults() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS
                .iter()
                .map(|(pattern, label)| (pattern.to_string(), label.to_string()))
                .collect(),
        }
    }

    /// 内置表之后追加 `extra`，追加的规则优先级总是低于内置规则
    pub fn with_extra(extra: &[PatternRule]) -> Self {
        let mut classifier = Self::with_defaults();
        for rule in extra {
            classifier.push(&rule.pattern, &rule.label);
        }
        classifier
    }

    /// 以最低优先级追加一条规则
    pub fn push(&mut self, pattern: &str, label: &str) {
        let pattern = normalize_path(Path::new(pattern));
        if pattern.is_empty() {
            return;
        }
        self.patterns.push((pattern, label.to_string()));
    }

    /// 返回路径中包含的第一个模式对应的分类，未命中时返回 [`DEFAULT_LABEL`]
    pub fn classify<P: AsRef<Path>>(&self, path: P) -> &str {
        let normalized = normalize_path(path.as_ref());
        self.patterns
            .iter()
            .find(|(pattern, _)| normalized.contains(pattern.as_str()))
            .map(|(_, label)| label.as_str())
            .unwrap_or(DEFAULT_LABEL)
    }

    pub fn patterns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.patterns
            .iter()
            .map(|(pattern, label)| (pattern.as_str(), label.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_patterns() {
        let classifier = PatternClassifier::default();
        assert_eq!(
            classifier.classify("/home/alice/app/node_modules"),
            "Node.js packages"
        );
        assert_eq!(classifier.classify("/srv/app/__pycache__"), "Python cache");
        assert_eq!(classifier.classify("/home/alice/.npm/_cacache"), "NPM cache");
        assert_eq!(
            classifier.classify(r"C:\Users\alice\AppData\Local\Temp"),
            "Temporary files"
        );
        assert_eq!(classifier.classify(r"C:\Windows\Temp"), "Windows temp files");
        assert_eq!(classifier.classify("/home/alice/Downloads"), "Downloads folder");
    }

    #[test]
    fn test_classify_default_label() {
        let classifier = PatternClassifier::default();
        assert_eq!(classifier.classify("/home/alice/photos"), DEFAULT_LABEL);
    }

    #[test]
    fn test_first_pattern_wins() {
        let classifier = PatternClassifier::default();
        // node_modules 在表中排在 .npm 之前
        let path = "/home/alice/.npm/node_modules/pkg";
        assert_eq!(classifier.classify(path), "Node.js packages");
        // 重复调用结果不变
        for _ in 0..3 {
            assert_eq!(classifier.classify(path), "Node.js packages");
        }
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        let classifier = PatternClassifier::default();
        assert_eq!(classifier.classify("/HOME/ALICE/NODE_MODULES"), "Node.js packages");
    }

    #[test]
    fn test_extra_rules_have_lowest_priority() {
        let classifier = PatternClassifier::with_extra(&[
            PatternRule {
                pattern: "Target".to_string(),
                label: "Rust build output".to_string(),
            },
            PatternRule {
                pattern: "node_modules".to_string(),
                label: "Shadowed".to_string(),
            },
        ]);
        assert_eq!(classifier.classify("/work/app/target"), "Rust build output");
        assert_eq!(classifier.classify("/work/app/node_modules"), "Node.js packages");
        assert_eq!(classifier.patterns().count(), DEFAULT_PATTERNS.len() + 2);
    }
}
