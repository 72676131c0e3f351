use sqlx::PgPool;

/// Store the cleaned text on the document row.
///
/// Returns the number of rows updated; zero means the document no longer exists.
pub async fn update_document_extract(
    pool: &PgPool,
    document_id: i64,
    extract: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE documents
        SET extract = $1
        WHERE id = $2
        "#,
    )
    .bind(extract)
    .bind(document_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Round-trip a trivial query (for health checks).
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
