//! End-to-end pipeline tests over the public API: real parser registry,
//! real blob directories, and the development vector store backends.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use docbase::domain::{meta_keys, MetadataFilter, SourceStatus, VectorStore};
use docbase::infrastructure::catalog::GroupManager;
use docbase::infrastructure::ingestion::{
    DataProcessor, HttpWebpageLoader, ParserRegistry, WebSettings,
};
use docbase::infrastructure::services::{FileUpload, PipelineOptions, PipelineService};
use docbase::infrastructure::vector_store::{InMemoryVectorStore, JsonFileVectorStore};

fn engine(dir: &Path, store: Arc<dyn VectorStore>) -> (PipelineService, Arc<GroupManager>) {
    let groups = Arc::new(GroupManager::new(
        dir.join("data"),
        dir.join("data/group_meta.json"),
    ));
    let processor = Arc::new(DataProcessor::new(
        Arc::new(ParserRegistry::default()),
        Arc::new(HttpWebpageLoader::new(WebSettings::default()).expect("http client")),
    ));
    let service = PipelineService::new(
        Arc::clone(&groups),
        store,
        processor,
        PipelineOptions::default(),
    );
    (service, groups)
}

/// Polls the catalog until every listed record has left `processing`.
async fn wait_until_indexed(groups: &GroupManager, group_id: Uuid, ids: &[Uuid]) {
    for _ in 0..300 {
        let sources = groups.list_sources(group_id).await.expect("list sources");
        let settled = ids.iter().all(|id| {
            sources
                .iter()
                .find(|s| s.id == *id)
                .is_some_and(|s| s.status != SourceStatus::Processing)
        });
        if settled {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("indexing did not settle in time");
}

async fn assert_all_completed(groups: &GroupManager, group_id: Uuid, ids: &[Uuid]) {
    let sources = groups.list_sources(group_id).await.expect("list sources");
    for id in ids {
        let entry = sources
            .iter()
            .find(|s| s.id == *id)
            .unwrap_or_else(|| panic!("record {id} missing from the catalog"));
        assert_eq!(entry.status, SourceStatus::Completed, "record {id}");
    }
}

/// Builds a PDF where each input string becomes one page of Helvetica text.
fn pdf_with_pages(pages_text: &[&str]) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages_text {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 18.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode page content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialize pdf");
    bytes
}

#[tokio::test]
async fn test_astronomy_course_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    let (service, groups) = engine(dir.path(), store.clone());

    let group = groups
        .create_group("astronomy", "Planetary science course")
        .await
        .expect("create group");

    // Page two is below the extraction threshold and must vanish.
    let pdf = pdf_with_pages(&[
        "Saturn is the sixth planet from the Sun and its rings are mostly water ice",
        "page two",
        "Jupiter is the largest planet and its red spot is a giant rotating storm",
    ]);
    let receipt = service
        .ingest_files(group.id, vec![FileUpload::new("course.pdf", pdf)])
        .await
        .expect("ingest");
    assert_eq!(receipt.accepted.len(), 1);
    assert!(receipt.skipped.is_empty());

    let ids: Vec<Uuid> = receipt.accepted.iter().map(|a| a.id).collect();
    wait_until_indexed(&groups, group.id, &ids).await;
    assert_all_completed(&groups, group.id, &ids).await;

    // The short page was dropped, so labels skip from 1 to 3.
    let scope = MetadataFilter::eq(meta_keys::GROUP_ID, group.id.to_string());
    let nodes = store.get_where(&scope).await.unwrap();
    assert_eq!(nodes.len(), 2);
    let mut labels: Vec<&str> = nodes
        .iter()
        .filter_map(|n| n.metadata.get(meta_keys::PAGE_LABEL).map(String::as_str))
        .collect();
    labels.sort_unstable();
    assert_eq!(labels, ["1", "3"]);

    let matches = service
        .query("saturn rings ice", &[group.id], None)
        .await
        .expect("query");
    assert!(!matches.is_empty());
    assert_eq!(
        matches[0].node.metadata.get(meta_keys::PAGE_LABEL).map(String::as_str),
        Some("1")
    );
    assert_eq!(
        matches[0].node.metadata.get(meta_keys::FILE_NAME).map(String::as_str),
        Some("course.pdf")
    );

    // Deleting the group clears vectors, the directory, and the catalog.
    let directory = group.directory.clone();
    service.delete_group(group.id).await.expect("delete group");
    assert_eq!(store.count_where(&scope).await.unwrap(), 0);
    assert!(!Path::new(&directory).exists());
    assert!(groups.get_group(group.id).await.is_err());
}

#[tokio::test]
async fn test_concurrent_uploads_to_distinct_groups() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    let (service, groups) = engine(dir.path(), store.clone());

    let optics = groups.create_group("optics", "").await.unwrap();
    let geology = groups.create_group("geology", "").await.unwrap();

    let mirror_text = "Reflecting telescopes gather light with a curved primary mirror";
    let lava_text = "Shield volcanoes build broad slopes from fluid basalt lava flows";
    let (left, right) = tokio::join!(
        service.ingest_files(
            optics.id,
            vec![FileUpload::new("telescopes.txt", mirror_text.as_bytes().to_vec())],
        ),
        service.ingest_files(
            geology.id,
            vec![FileUpload::new("volcanoes.txt", lava_text.as_bytes().to_vec())],
        ),
    );
    let left = left.expect("optics ingest");
    let right = right.expect("geology ingest");
    assert_eq!(left.accepted.len(), 1);
    assert_eq!(right.accepted.len(), 1);

    wait_until_indexed(&groups, optics.id, &[left.accepted[0].id]).await;
    wait_until_indexed(&groups, geology.id, &[right.accepted[0].id]).await;
    assert_all_completed(&groups, optics.id, &[left.accepted[0].id]).await;
    assert_all_completed(&groups, geology.id, &[right.accepted[0].id]).await;

    // Each group sees exactly its own upload.
    for (group, query, other_query) in [
        (&optics, "primary mirror", "basalt lava"),
        (&geology, "basalt lava", "primary mirror"),
    ] {
        let own = service.query(query, &[group.id], None).await.unwrap();
        assert_eq!(own.len(), 1, "{} should hold its own document", group.name);
        let foreign = service.query(other_query, &[group.id], None).await.unwrap();
        assert!(foreign.is_empty(), "{} must not leak across groups", group.name);
    }
}

#[tokio::test]
async fn test_removing_one_source_leaves_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    let (service, groups) = engine(dir.path(), store.clone());

    let group = groups.create_group("notes", "").await.unwrap();
    let receipt = service
        .ingest_files(
            group.id,
            vec![
                FileUpload::new(
                    "comets.txt",
                    b"Comets grow long tails of gas and dust when they approach the sun".to_vec(),
                ),
                FileUpload::new(
                    "asteroids.txt",
                    b"Most asteroids orbit between mars and jupiter in the main belt".to_vec(),
                ),
            ],
        )
        .await
        .expect("ingest");
    let ids: Vec<Uuid> = receipt.accepted.iter().map(|a| a.id).collect();
    wait_until_indexed(&groups, group.id, &ids).await;
    assert_all_completed(&groups, group.id, &ids).await;

    let removed_id = receipt.accepted[0].id;
    let all_ok = service
        .delete_sources(group.id, &[removed_id])
        .await
        .expect("delete sources");
    assert!(all_ok);

    let gone = MetadataFilter::eq(meta_keys::FILE_ID, removed_id.to_string());
    assert_eq!(store.count_where(&gone).await.unwrap(), 0);
    assert!(!Path::new(&group.directory).join("comets.txt").exists());
    assert!(Path::new(&group.directory).join("asteroids.txt").exists());

    let remaining = groups.list_sources(group.id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "asteroids.txt");

    let matches = service.query("main belt", &[group.id], None).await.unwrap();
    assert_eq!(matches.len(), 1);
}

#[tokio::test]
async fn test_catalog_and_vectors_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("data/vector_store.json");

    let ingested_id;
    let group_id;
    {
        let store = Arc::new(JsonFileVectorStore::new(&store_path));
        let (service, groups) = engine(dir.path(), store);
        let group = groups.create_group("geology", "").await.unwrap();
        group_id = group.id;
        let receipt = service
            .ingest_files(
                group.id,
                vec![FileUpload::new(
                    "minerals.txt",
                    b"Quartz crystals form hexagonal prisms inside granite cavities".to_vec(),
                )],
            )
            .await
            .unwrap();
        ingested_id = receipt.accepted[0].id;
        wait_until_indexed(&groups, group.id, &[ingested_id]).await;
        assert_all_completed(&groups, group.id, &[ingested_id]).await;
    }

    // A fresh engine over the same directory sees the same state.
    let store = Arc::new(JsonFileVectorStore::new(&store_path));
    let (service, groups) = engine(dir.path(), store);
    let summaries = groups.list_groups().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].name, "geology");
    assert_eq!(summaries[0].file_count, 1);

    let sources = groups.list_sources(group_id).await.unwrap();
    assert_eq!(sources[0].id, ingested_id);
    assert_eq!(sources[0].status, SourceStatus::Completed);

    let matches = service
        .query("quartz crystals", &[group_id], None)
        .await
        .unwrap();
    assert_eq!(matches.len(), 1);
    assert!(matches[0].node.text.contains("granite"));
}

#[tokio::test]
async fn test_webpage_ingestion_over_http() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    let body = r#"<html>
<head><title>Tides</title></head>
<body>
<p>Ocean tides follow the combined pull of the moon and the sun.</p>
<p>Spring tides arrive when both pulls line up at new moon.</p>
</body>
</html>"#;
    Mock::given(method("GET"))
        .and(path("/tides"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    let (service, groups) = engine(dir.path(), store.clone());
    let group = groups.create_group("oceans", "").await.unwrap();

    let url = format!("{}/tides", server.uri());
    let receipt = service
        .ingest_webpages(group.id, vec![url.clone()])
        .await
        .expect("ingest webpages");
    assert_eq!(receipt.accepted.len(), 1);
    assert_eq!(receipt.accepted[0].name, url);

    wait_until_indexed(&groups, group.id, &[receipt.accepted[0].id]).await;
    assert_all_completed(&groups, group.id, &[receipt.accepted[0].id]).await;

    let matches = service
        .query("spring tides moon", &[group.id], None)
        .await
        .unwrap();
    assert!(!matches.is_empty());
    assert_eq!(
        matches[0].node.metadata.get(meta_keys::SOURCE_URL),
        Some(&url)
    );
}
