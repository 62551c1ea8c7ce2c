//! Access control: permission checks and page visibility.
//!
//! Visibility is expressed as a store [`Predicate`] so listings are filtered
//! by SQLite. [`page_visible`] is the same rule evaluated on one loaded page,
//! used for direct fetches.

use crate::db::{Field, Predicate};
use crate::errors::AppError;
use crate::models::{AccessLevel, DocId, Page, Permission, User};

/// Direct set-membership test; ADMIN does not imply EDITOR or the reverse.
pub fn has_permission(user: &User, permission: Permission) -> bool {
    user.has_permission(permission)
}

/// Fail with `PermissionDenied` unless the user holds `permission`.
pub fn require_permission(user: &User, permission: Permission) -> Result<(), AppError> {
    if has_permission(user, permission) {
        Ok(())
    } else {
        tracing::debug!(
            "User {} lacks {} permission",
            user.name,
            permission.as_str()
        );
        Err(AppError::PermissionDenied(format!(
            "{} permission required",
            permission.as_str()
        )))
    }
}

/// Groups whose pages the user may see: every group for an admin, otherwise
/// the groups listing the user as a member.
pub fn group_visibility_filter(user: &User) -> Predicate {
    if has_permission(user, Permission::Admin) {
        Predicate::All
    } else {
        Predicate::contains(Field::Members, user.id)
    }
}

/// Store predicate matching the pages `user` may list, given the ids of the
/// groups selected by [`group_visibility_filter`].
///
/// A page is visible to its author, to everyone when public, and to members
/// of any of its groups when its access level is `group`. Admins see every
/// group, so for them `visible_groups` is ignored and the store matches any
/// existing group instead of binding each id.
pub fn page_visibility_filter(user: &User, visible_groups: &[DocId]) -> Predicate {
    let in_visible_group = if has_permission(user, Permission::Admin) {
        Predicate::ReferencesGroup(Field::PageGroups)
    } else {
        Predicate::intersects(Field::PageGroups, visible_groups.iter().copied())
    };

    Predicate::Or(vec![
        Predicate::eq(Field::Author, user.id),
        Predicate::eq(Field::Access, AccessLevel::Public),
        Predicate::And(vec![
            Predicate::eq(Field::Access, AccessLevel::Group),
            in_visible_group,
        ]),
    ])
}

/// In-memory counterpart of [`page_visibility_filter`] for a single page.
pub fn page_visible(user: &User, page: &Page, visible_groups: &[DocId]) -> bool {
    page.author_id == user.id
        || page.access == AccessLevel::Public
        || (page.access == AccessLevel::Group
            && page.groups.iter().any(|g| visible_groups.contains(g)))
}

/// Whether `user` may open `page` directly: visible pages, or any page for admins.
pub fn can_view(user: &User, page: &Page, visible_groups: &[DocId]) -> bool {
    has_permission(user, Permission::Admin) || page_visible(user, page, visible_groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Article;
    use chrono::Utc;

    fn user(permissions: &[Permission]) -> User {
        User {
            id: DocId::new(),
            name: "tester".into(),
            email: "tester@example.com".into(),
            password_hash: String::new(),
            permissions: permissions.iter().copied().collect(),
            disabled: false,
        }
    }

    fn page(author: DocId, access: AccessLevel, groups: Vec<DocId>) -> Page {
        Page {
            id: DocId::new(),
            author_id: author,
            article: Article {
                id: DocId::new(),
                title: "t".into(),
                body: "b".into(),
                editor_user_id: author,
                edited_at: Utc::now(),
            },
            history: Vec::new(),
            projects: Vec::new(),
            access,
            groups,
        }
    }

    #[test]
    fn test_require_permission() {
        let editor = user(&[Permission::Editor]);
        assert!(require_permission(&editor, Permission::Editor).is_ok());
        let err = require_permission(&editor, Permission::Admin).unwrap_err();
        assert!(matches!(err, AppError::PermissionDenied(_)));

        let admin = user(&[Permission::Admin]);
        assert!(require_permission(&admin, Permission::Editor).is_err());
    }

    #[test]
    fn test_group_filter_for_admin_is_unconstrained() {
        let admin = user(&[Permission::Admin]);
        assert_eq!(group_visibility_filter(&admin), Predicate::All);

        let editor = user(&[Permission::Editor]);
        assert_eq!(
            group_visibility_filter(&editor),
            Predicate::contains(Field::Members, editor.id)
        );
    }

    #[test]
    fn test_admin_page_filter_joins_groups() {
        let admin = user(&[Permission::Admin]);
        let many: Vec<DocId> = (0..100).map(|_| DocId::new()).collect();

        let filter = page_visibility_filter(&admin, &many);
        assert_eq!(filter, page_visibility_filter(&admin, &[]));
        assert_eq!(filter.to_sql().1.len(), 3);
    }

    #[test]
    fn test_private_page_only_for_author() {
        let author = user(&[Permission::Editor]);
        let other = user(&[Permission::Editor]);
        let doc = page(author.id, AccessLevel::Private, Vec::new());

        assert!(page_visible(&author, &doc, &[]));
        assert!(!page_visible(&other, &doc, &[]));
    }

    #[test]
    fn test_public_page_for_everyone() {
        let doc = page(DocId::new(), AccessLevel::Public, Vec::new());
        assert!(page_visible(&user(&[]), &doc, &[]));
    }

    #[test]
    fn test_group_page_needs_shared_group() {
        let group = DocId::new();
        let reader = user(&[]);
        let doc = page(DocId::new(), AccessLevel::Group, vec![group]);

        assert!(page_visible(&reader, &doc, &[group]));
        assert!(!page_visible(&reader, &doc, &[DocId::new()]));
        assert!(!page_visible(&reader, &doc, &[]));
    }

    #[test]
    fn test_private_page_ignores_stale_groups() {
        let group = DocId::new();
        let doc = page(DocId::new(), AccessLevel::Private, vec![group]);
        assert!(!page_visible(&user(&[]), &doc, &[group]));
    }

    #[test]
    fn test_admin_can_view_private_page_directly() {
        let admin = user(&[Permission::Admin]);
        let doc = page(DocId::new(), AccessLevel::Private, Vec::new());

        assert!(!page_visible(&admin, &doc, &[]));
        assert!(can_view(&admin, &doc, &[]));
        assert!(!can_view(&user(&[Permission::Editor]), &doc, &[]));
    }
}
