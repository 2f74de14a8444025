mod accounts;
mod ledger;
mod rules;

pub(crate) fn db_err(e: sqlx::Error) -> domain::Error {
    domain::Error::internal(e)
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(d) if d.is_unique_violation())
}
