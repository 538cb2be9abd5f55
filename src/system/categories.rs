use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::store::Store;
use crate::types::Category;

struct Seed {
    name: &'static str,
    icon: &'static str,
    children: &'static [(&'static str, &'static str)],
}

const DEFAULT_CATEGORIES: &[Seed] = &[
    Seed {
        name: "Teaching",
        icon: "fa-graduation-cap",
        children: &[
            ("Slides", "fa-file-powerpoint-o"),
            ("Syllabi", "fa-list-alt"),
            ("Lesson plans", "fa-book"),
            ("Exams", "fa-file-text-o"),
        ],
    },
    Seed {
        name: "Research",
        icon: "fa-flask",
        children: &[
            ("Papers", "fa-file-text"),
            ("Research reports", "fa-file-pdf-o"),
            ("Experiment data", "fa-table"),
            ("Project documents", "fa-folder"),
        ],
    },
    Seed {
        name: "Administration",
        icon: "fa-briefcase",
        children: &[
            ("Meeting minutes", "fa-calendar"),
            ("Announcements", "fa-bullhorn"),
            ("Work plans", "fa-tasks"),
            ("Summary reports", "fa-file-o"),
        ],
    },
    Seed {
        name: "Student work",
        icon: "fa-users",
        children: &[
            ("Grading", "fa-check-circle"),
            ("Transcripts", "fa-bar-chart"),
            ("Student projects", "fa-star"),
        ],
    },
    Seed {
        name: "Other",
        icon: "fa-folder-o",
        children: &[],
    },
];

/// Returns the category called `name`, creating it if it does not exist.
/// The flag is true when a row was inserted.
fn ensure_category(
    store: &dyn Store,
    name: &str,
    icon: &str,
    parent_id: Option<&str>,
    created_by: &str,
) -> Result<(Category, bool)> {
    if let Some(existing) = store.get_category_by_name(name)? {
        return Ok((existing, false));
    }

    let category = Category {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        parent_id: parent_id.map(str::to_string),
        icon: icon.to_string(),
        is_active: true,
        created_by: Some(created_by.to_string()),
        created_at: Utc::now(),
    };
    store.create_category(&category)?;
    Ok((category, true))
}

/// Creates the default two-level category tree on behalf of `created_by`,
/// an administrator. Names that already exist are left alone, so running
/// it again is harmless. Returns how many categories were created.
pub fn seed_default_categories(store: &dyn Store, created_by: &str) -> Result<usize> {
    let mut created = 0;

    for seed in DEFAULT_CATEGORIES {
        let (parent, inserted) = ensure_category(store, seed.name, seed.icon, None, created_by)?;
        if inserted {
            tracing::info!("Created category {}", parent.name);
            created += 1;
        }

        for (name, icon) in seed.children {
            let (_, inserted) =
                ensure_category(store, name, icon, Some(parent.id.as_str()), created_by)?;
            if inserted {
                tracing::info!("Created category {} under {}", name, parent.name);
                created += 1;
            }
        }
    }

    Ok(created)
}
