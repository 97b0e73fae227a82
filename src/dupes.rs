use ahash::AHashMap;
use serde::Serialize;

use crate::extract::{Link, LinkCategory};
use crate::resolve::Resolver;

/// Links of one document that all point at the same place
#[derive(Serialize, Debug, Clone)]
pub struct DuplicateGroup {
    pub source: String,
    /// Resolved `path#anchor` for internal links, the raw URL otherwise
    pub target: String,
    pub count: usize,
    pub links: Vec<Link>,
}

/// Group the internal and external links of one document by target.
/// Groups come out in order of first appearance, members in extraction order.
pub fn find_duplicates(resolver: &Resolver<'_>, links: &[Link]) -> Vec<DuplicateGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: AHashMap<String, Vec<&Link>> = AHashMap::new();

    for link in links {
        let key = match link.category {
            LinkCategory::Internal => resolver
                .resolve(link)
                .map(|t| t.key())
                .unwrap_or_else(|| link.target.clone()),
            LinkCategory::External => link.target.clone(),
            LinkCategory::AnchorOnly | LinkCategory::Mailto => continue,
        };
        let members = groups.entry(key.clone()).or_default();
        if members.is_empty() {
            order.push(key);
        }
        members.push(link);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let members = groups.remove(&key)?;
            if members.len() < 2 {
                return None;
            }
            Some(DuplicateGroup {
                source: members[0].source.clone(),
                count: members.len(),
                links: members.into_iter().cloned().collect(),
                target: key,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::extract::extract_links;

    #[test]
    fn test_same_resolved_target_grouped() {
        let config = Config::default();
        let resolver = Resolver::new(&config);
        let text = "[a](../security/policy.md) then \
            <a href=\"{{ '/corpus/security/policy.html' | relative_url }}\">again</a> \
            and [other](../security/policy.md#scope)";
        let links = extract_links("dev/guide.md", text);
        let groups = find_duplicates(&resolver, &links);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].target, "security/policy.md");
        assert_eq!(groups[0].source, "dev/guide.md");
        assert_eq!(groups[0].links[0].text, "a");
        assert_eq!(groups[0].links[1].text, "again");
    }

    #[test]
    fn test_external_grouped_by_raw_target() {
        let config = Config::default();
        let resolver = Resolver::new(&config);
        let text = "https://docs.rs/regex and [regex](https://docs.rs/regex) and #x [x](#x) [y](#x)";
        let groups = find_duplicates(&resolver, &extract_links("a.md", text));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].target, "https://docs.rs/regex");
        assert_eq!(groups[0].count, 2);
    }
}
