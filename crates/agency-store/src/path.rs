//! # path
//!
//! why: every key the store sees ("/a//b/", "a/b", "") must address the same node
//! relations: used by node.rs for object keys, store.rs for mutation and read paths
//! what: normalize, to_path_string

/// split a raw path into its segments
///
/// repeated, leading and trailing slashes are dropped, so `"/"`, `""` and
/// `"///"` all yield the empty sequence, i.e. the root.
pub fn normalize(raw: &str) -> Vec<String> {
    raw.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_owned)
        .collect()
}

/// canonical string form, `"/"` for the root
pub fn to_path_string(segments: &[String]) -> String {
    if segments.is_empty() {
        return "/".to_owned();
    }
    segments.iter().fold(String::new(), |mut out, segment| {
        out.push('/');
        out.push_str(segment);
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_aliases() {
        assert!(normalize("").is_empty());
        assert!(normalize("/").is_empty());
        assert!(normalize("////").is_empty());
    }

    #[test]
    fn collapses_slashes() {
        assert_eq!(normalize("//a///b//"), vec!["a", "b"]);
        assert_eq!(normalize("a/b"), normalize("/a/b/"));
    }

    #[test]
    fn keeps_dots_and_spaces() {
        assert_eq!(normalize("/.agency/x y"), vec![".agency", "x y"]);
    }

    #[test]
    fn string_form_is_canonical() {
        assert_eq!(to_path_string(&normalize("a//b/")), "/a/b");
        assert_eq!(to_path_string(&[]), "/");
    }
}
