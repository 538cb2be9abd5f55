use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Declares a closed set of string-backed values stored as TEXT columns.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "invalid {} '{other}'",
                        stringify!($name).to_lowercase()
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                text.parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

text_enum! {
    /// Account role. Administrators manage the system; teachers own documents.
    Role {
        Admin => "admin",
        Teacher => "teacher",
    }
}

text_enum! {
    DocumentStatus {
        Draft => "draft",
        Review => "review",
        Published => "published",
        Archived => "archived",
        Rejected => "rejected",
    }
}

impl DocumentStatus {
    /// Statuses a teacher may pick when creating or editing a document.
    /// Archived and rejected are reachable only through review.
    #[must_use]
    pub const fn selectable_by_teacher(self) -> bool {
        matches!(self, Self::Draft | Self::Review | Self::Published)
    }
}

text_enum! {
    BackupStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

text_enum! {
    LogLevel {
        Debug => "DEBUG",
        Info => "INFO",
        Warning => "WARNING",
        Error => "ERROR",
        Critical => "CRITICAL",
    }
}

text_enum! {
    UserOperation {
        Create => "create",
        Update => "update",
        Delete => "delete",
        Freeze => "freeze",
        Unfreeze => "unfreeze",
        PasswordReset => "password_reset",
        Login => "login",
        Logout => "logout",
    }
}

text_enum! {
    DocumentOperation {
        Create => "create",
        Update => "update",
        Delete => "delete",
        Download => "download",
        View => "view",
        Star => "star",
        Archive => "archive",
        Publish => "publish",
    }
}
