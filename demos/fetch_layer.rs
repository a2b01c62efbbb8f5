use featureserver_http::{BoundingBox, GisClient, LayerQuery};
use futures::TryStreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let layer_path = std::env::var("GIS_LAYER_PATH")?;
    let client = GisClient::from_env()?;

    let bbox = BoundingBox::from_center_radius(39.7392, -104.9903, 5.0)?;
    let query = LayerQuery::new(client.service_url(&layer_path))
        .with_geometry(bbox)
        .with_max_records(2_500);

    client
        .with_session(|client| async move {
            let fields = client.layer_fields(&layer_path).await?;
            for field in &fields {
                println!(
                    "{} ({})",
                    field.name,
                    field.field_type.as_deref().unwrap_or("unknown")
                );
            }

            let pages = client.fetch_pages(&query);
            futures::pin_mut!(pages);
            while let Some(page) = pages.try_next().await? {
                println!(
                    "offset {}: {} features{}",
                    page.offset,
                    page.len(),
                    if page.exceeded_transfer_limit {
                        " (transfer limit)"
                    } else {
                        ""
                    }
                );
            }

            println!("{} requests sent", client.request_count());
            Ok(())
        })
        .await?;

    Ok(())
}
