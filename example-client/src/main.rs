use std::sync::Arc;

use iris_table_engine::{
    EngineConfig, FilterCriterion, MetadataService, PageRequest, QueryExecutor, SortDirection,
    SortSpec,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod transport;

use transport::InMemoryTransport;

#[tokio::main]
async fn main() -> iris_table_engine::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("iris_table_engine=debug")),
        )
        .init();

    let transport = Arc::new(InMemoryTransport::seeded(127));
    let config = EngineConfig::default();
    let metadata = MetadataService::new(transport.clone(), config.clone());
    let executor = QueryExecutor::new(transport, "DEMO", config);
    let cancel = CancellationToken::new();

    // Discover what the server offers
    let namespaces = metadata.namespaces(&cancel).await?;
    println!("Namespaces: {namespaces:?}");

    let tables = metadata.tables("DEMO", &cancel).await?;
    println!("Tables: {:?}", tables.iter().map(|t| t.display()).collect::<Vec<_>>());

    let table = tables[0].clone();
    let schema = metadata.table_schema("DEMO", &table, &cancel).await?;
    for column in &schema.columns {
        println!(
            "  {} {} nullable={} read_only={}",
            column.name, column.sql_type, column.nullable, column.is_read_only
        );
    }

    // Browse page by page
    for page_offset in 0..3 {
        let page = executor
            .fetch_page(
                &schema,
                PageRequest::new(50, page_offset)?,
                &[],
                &SortSpec::by("ID", SortDirection::Ascending),
                &cancel,
            )
            .await?;
        println!(
            "Page {page_offset}: {} rows of {}",
            page.rows.len(),
            page.total_matching_row_count
        );
    }

    // Filtered view: employee names ending in 7
    let filters = vec![FilterCriterion {
        column: "Name".to_string(),
        pattern: "*7".to_string(),
    }];
    let matching = executor.count_matching(&schema, &filters, &cancel).await?;
    println!("Rows matching \"*7\": {matching}");

    // Edit a cell, add a row, remove a row
    executor
        .update_cell(&table, "Name", json!("Renamed"), "ID", json!(1), &cancel)
        .await?;
    executor
        .insert_row(
            &table,
            &["Name".to_string(), "Active".to_string()],
            vec![json!("New hire"), json!("1")],
            &cancel,
        )
        .await?;
    executor.delete_row(&table, "ID", json!(2), &cancel).await?;
    println!("Applied one update, one insert, one delete");

    // Export everything in chunks of 25, reporting progress
    let mut stream =
        executor.export_all_matching(schema.clone(), Vec::new(), SortSpec::none(), 25)?;
    while let Some(batch) = stream.next_batch(&cancel).await? {
        let percent = batch.progress().map(|p| p * 100.0).unwrap_or(0.0);
        println!(
            "Exported {} / {} rows ({percent:.0}%)",
            batch.rows_so_far, batch.total_matching_row_count
        );
    }

    Ok(())
}
