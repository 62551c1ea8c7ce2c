//! Query composer for page listings.
//!
//! Combines the caller's visibility predicate with free-text search terms
//! into one store predicate. Every term must match the title or the body.

use crate::access::{group_visibility_filter, has_permission, page_visibility_filter};
use crate::db::{DocStore, Field, Predicate};
use crate::errors::AppError;
use crate::models::{DocId, Permission, User};

/// Split a search string into non-empty whitespace-separated terms.
pub fn search_terms(search: &str) -> Vec<&str> {
    search.split_whitespace().collect()
}

/// Build the listing predicate from already-resolved visible group ids.
pub fn page_filter(user: &User, visible_groups: &[DocId], search: Option<&str>) -> Predicate {
    let visibility = page_visibility_filter(user, visible_groups);

    let terms = search.map(search_terms).unwrap_or_default();
    if terms.is_empty() {
        return visibility;
    }

    let mut clauses = Vec::with_capacity(terms.len() + 1);
    clauses.push(visibility);
    clauses.extend(terms.into_iter().map(|term| {
        Predicate::Or(vec![
            Predicate::Substring(Field::ArticleTitle, term.to_string()),
            Predicate::Substring(Field::ArticleBody, term.to_string()),
        ])
    }));
    Predicate::And(clauses)
}

/// Ids of the groups granting `user` visibility.
pub async fn visible_group_ids(store: &DocStore, user: &User) -> Result<Vec<DocId>, AppError> {
    let groups = store.find_groups(&group_visibility_filter(user)).await?;
    Ok(groups.into_iter().map(|g| g.id).collect())
}

/// Resolve the caller's groups and build the listing predicate.
///
/// Admin listings join against the groups collection in the store, so their
/// group ids are never loaded.
pub async fn compose(
    store: &DocStore,
    user: &User,
    search: Option<&str>,
) -> Result<Predicate, AppError> {
    let groups = if has_permission(user, Permission::Admin) {
        Vec::new()
    } else {
        visible_group_ids(store, user).await?
    };
    Ok(page_filter(user, &groups, search))
}
