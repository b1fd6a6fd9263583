//! Query-time tenant filter injection for raw Cypher strings.

use std::collections::HashMap;

/// Inserts `alias.tenant_id = $__tenant_id` into `cypher`'s `WHERE` clause,
/// ahead of any existing predicates, or appends a new `WHERE` when the
/// query has none. Case-insensitive match on the `WHERE` keyword.
pub fn inject_tenant_filter(cypher: &str, alias: &str) -> String {
    let predicate = format!("{alias}.tenant_id = $__tenant_id");

    let lower = cypher.to_lowercase();
    if let Some(pos) = lower.find(" where ") {
        let insert_at = pos + " where ".len();
        let mut out = String::with_capacity(cypher.len() + predicate.len() + 5);
        out.push_str(&cypher[..insert_at]);
        out.push_str(&predicate);
        out.push_str(" AND ");
        out.push_str(&cypher[insert_at..]);
        out
    } else {
        format!("{cypher} WHERE {predicate}")
    }
}

pub fn build_tenant_params(tenant_id: &str) -> HashMap<String, serde_json::Value> {
    HashMap::from([("__tenant_id".to_string(), serde_json::Value::String(tenant_id.to_string()))])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn injects_into_existing_where_clause() {
        let cypher = "MATCH (s:Service) WHERE s.name = 'gw' RETURN s";
        let result = inject_tenant_filter(cypher, "s");
        assert_eq!(
            result,
            "MATCH (s:Service) WHERE s.tenant_id = $__tenant_id AND s.name = 'gw' RETURN s"
        );
    }

    #[test]
    fn appends_where_clause_when_absent() {
        let cypher = "MATCH (s:Service) RETURN s";
        let result = inject_tenant_filter(cypher, "s");
        assert_eq!(result, "MATCH (s:Service) RETURN s WHERE s.tenant_id = $__tenant_id");
    }

    #[test]
    fn build_tenant_params_contains_tenant_id() {
        let params = build_tenant_params("acme");
        assert_eq!(params.get("__tenant_id"), Some(&serde_json::Value::String("acme".to_string())));
    }
}
