//! Per-account credential store DSN derivation.
//!
//! Every account gets its own credential container so sessions can never
//! bleed across accounts. The container DSN is derived deterministically
//! from the configured base DSN.

/// Derive the credential container DSN for one account.
///
/// File-form DSNs get `_wa_<account_id>` inserted before the `.db`
/// extension (query string preserved); anything else gets an `acc`
/// parameter appended.
pub fn per_account_dsn(base: &str, account_id: &str) -> String {
    if base.is_empty() {
        return format!("sqlite:promote_wa_{account_id}.db");
    }

    let (path, query) = match base.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (base, None),
    };

    for prefix in ["sqlite://", "sqlite:", "file:"] {
        if let Some(file) = path.strip_prefix(prefix) {
            let file = if file.to_ascii_lowercase().ends_with(".db") {
                format!("{}_wa_{}.db", &file[..file.len() - 3], account_id)
            } else {
                format!("{file}_wa_{account_id}.db")
            };
            let mut dsn = format!("{prefix}{file}");
            if let Some(query) = query {
                dsn.push('?');
                dsn.push_str(query);
            }
            return dsn;
        }
    }

    // Not a file-form DSN: disambiguate with a parameter.
    match query {
        Some(query) => format!("{path}?{query}&acc={account_id}"),
        None => format!("{path}?acc={account_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_account_before_db_extension() {
        assert_eq!(
            per_account_dsn("sqlite:promote.db?mode=rwc", "a1"),
            "sqlite:promote_wa_a1.db?mode=rwc"
        );
        assert_eq!(
            per_account_dsn("file:data/promote.db", "a1"),
            "file:data/promote_wa_a1.db"
        );
    }

    #[test]
    fn appends_extension_when_missing() {
        assert_eq!(
            per_account_dsn("sqlite:data/promote", "a1"),
            "sqlite:data/promote_wa_a1.db"
        );
    }

    #[test]
    fn non_file_dsn_gets_parameter() {
        assert_eq!(
            per_account_dsn("postgres://localhost/promote", "a1"),
            "postgres://localhost/promote?acc=a1"
        );
        assert_eq!(
            per_account_dsn("postgres://localhost/promote?sslmode=disable", "a1"),
            "postgres://localhost/promote?sslmode=disable&acc=a1"
        );
    }

    #[test]
    fn distinct_accounts_never_collide() {
        let a = per_account_dsn("sqlite:promote.db?mode=rwc", "a1");
        let b = per_account_dsn("sqlite:promote.db?mode=rwc", "a2");
        assert_ne!(a, b);
    }

    #[test]
    fn empty_base_still_isolates() {
        assert_eq!(per_account_dsn("", "a1"), "sqlite:promote_wa_a1.db");
    }
}
