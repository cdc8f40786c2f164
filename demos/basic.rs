use couchdb_http::{CouchDbClient, HttpAdapter, RevisionOrder};
use serde_json::json;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let http = HttpAdapter::new()?;
    let db = CouchDbClient::from_env(&http).map_err(anyhow::Error::msg)?;

    if !db.is_active() {
        anyhow::bail!("{} is not a CouchDB server", db.base_url());
    }

    db.create_database("albums")?;

    let doc = db.add_document("albums", &json!({ "title": "Blue Train" }))?;
    let doc = db.update_document_ref(
        "albums",
        &doc,
        &json!({ "title": "Blue Train", "artist": "John Coltrane" }),
    )?;

    for entry in db.revision_history("albums", &doc.id, RevisionOrder::Ascending)? {
        println!("{entry}");
    }

    for listed in db.list_documents_paged("albums", 10, true)? {
        println!("{} @ {}", listed.id, listed.rev);
    }

    Ok(())
}
