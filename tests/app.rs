use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;
use std::sync::Mutex;
use std::time::Instant;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Value, json};

use hero_catalog::api::CharacterApi;
use hero_catalog::app::{App, DownloadAction, ProgressEvent, ProgressSink};
use hero_catalog::config::{Config, ConfigLoader, DEFAULT_PORTRAIT_CLASS, ResolvedConfig};
use hero_catalog::domain::{CharacterRecord, CharacterTable};
use hero_catalog::error::CatalogError;
use hero_catalog::resolver::InfoboxPortraitLocator;
use hero_catalog::store::CanonicalStore;
use hero_catalog::wiki::WikiClient;

const WIKI: &str = "https://myheroacademia.fandom.com/wiki";

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

struct MockApi {
    payload: Option<Value>,
}

impl CharacterApi for MockApi {
    fn fetch_payload(&self) -> Result<Value, CatalogError> {
        self.payload
            .clone()
            .ok_or_else(|| CatalogError::ApiHttp("connection refused".to_string()))
    }
}

#[derive(Default)]
struct MockWiki {
    pages: HashMap<String, String>,
    images: HashMap<String, Vec<u8>>,
    broken_streams: HashSet<String>,
    page_calls: Mutex<Vec<String>>,
    download_calls: Mutex<Vec<String>>,
    call_times: Mutex<Vec<Instant>>,
}

impl MockWiki {
    fn with_portrait(mut self, name: &str, image_url: &str) -> Self {
        let page = format!("{WIKI}/{}", name.replace(' ', "_"));
        self.pages.insert(page, portrait_page(&image_url.replace("https:", "")));
        self.images
            .insert(image_url.to_string(), b"\x89PNG\r\n\x1a\nportrait".to_vec());
        self
    }

    fn with_page(mut self, name: &str, html: &str) -> Self {
        let page = format!("{WIKI}/{}", name.replace(' ', "_"));
        self.pages.insert(page, html.to_string());
        self
    }

    fn requests(&self) -> usize {
        self.page_calls.lock().unwrap().len() + self.download_calls.lock().unwrap().len()
    }
}

impl WikiClient for MockWiki {
    fn fetch_page(&self, url: &str) -> Result<String, CatalogError> {
        self.call_times.lock().unwrap().push(Instant::now());
        self.page_calls.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| CatalogError::WikiStatus {
                status: 404,
                message: "Not Found".to_string(),
            })
    }

    fn download(&self, url: &str, destination: &mut dyn Write) -> Result<u64, CatalogError> {
        self.call_times.lock().unwrap().push(Instant::now());
        self.download_calls.lock().unwrap().push(url.to_string());
        if self.broken_streams.contains(url) {
            destination.write_all(b"\x89PNG partial").unwrap();
            return Err(CatalogError::WikiHttp("stream interrupted".to_string()));
        }
        let bytes = self.images.get(url).ok_or_else(|| CatalogError::WikiStatus {
            status: 404,
            message: "Not Found".to_string(),
        })?;
        destination.write_all(bytes).unwrap();
        Ok(bytes.len() as u64)
    }
}

fn portrait_page(src: &str) -> String {
    format!(
        r#"<html><body><aside class="portable-infobox">
        <figure class="pi-item pi-image"><a href="{src}" class="image">
        <img src="{src}" class="pi-image-thumbnail" alt="portrait" width="268"></a></figure>
        </aside></body></html>"#
    )
}

fn test_config(root: &Utf8Path) -> ResolvedConfig {
    paced_config(root, 0)
}

fn paced_config(root: &Utf8Path, request_delay_ms: u64) -> ResolvedConfig {
    ConfigLoader::resolve_config(Config {
        store_path: Some(root.join("data/characters.csv")),
        image_dir: Some(root.join("images/characters")),
        request_delay_ms: Some(request_delay_ms),
        ..Config::default()
    })
    .unwrap()
}

fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

fn build_app(
    config: ResolvedConfig,
    payload: Option<Value>,
    wiki: MockWiki,
) -> App<MockApi, MockWiki, InfoboxPortraitLocator> {
    let locator = InfoboxPortraitLocator::new(DEFAULT_PORTRAIT_CLASS).unwrap();
    App::new(config, MockApi { payload }, wiki, locator)
}

fn write_store(config: &ResolvedConfig, rows: &[(&str, &str, &str)]) {
    let records = rows
        .iter()
        .map(|(id, name, category)| {
            CharacterRecord::new(*id, *name, *category, BTreeMap::new(), &config.image_dir)
        })
        .collect();
    let table = CharacterTable {
        columns: ["id", "name", "category", "image_path"]
            .map(String::from)
            .to_vec(),
        records,
    };
    CanonicalStore::new(config.image_dir.clone())
        .write(&table, &config.store_path)
        .unwrap();
}

#[test]
fn ingest_writes_store_with_canonical_categories() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    let payload = json!({
        "heroes": [{"id": "1", "name": "Izuku Midoriya", "quirk": "One For All"}],
        "villains": [{"id": "007", "name": "Tomura Shigaraki"}],
        "students": [],
        "other": []
    });
    let app = build_app(config.clone(), Some(payload), MockWiki::default());

    let result = app.ingest(&NoopSink).unwrap();
    assert!(result.written);
    assert_eq!(result.records, 2);

    let table = CanonicalStore::new(config.image_dir.clone())
        .read(&config.store_path)
        .unwrap();
    assert_eq!(table.records[0].category(), "Villains");
    assert_eq!(table.records[0].id(), "007");
    assert_eq!(table.records[1].category(), "Heroes");
}

#[test]
fn ingest_twice_is_byte_identical() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    let payload = json!({
        "students": [{"id": "3", "name": "Ochaco Uraraka", "class": "1-A"}],
        "heroes": [{"id": "1", "name": "All Might", "affiliation": "U.A."}],
        "villains": [],
        "other": [{"id": "10", "name": "Gran Torino"}]
    });
    let app = build_app(config.clone(), Some(payload), MockWiki::default());

    app.ingest(&NoopSink).unwrap();
    let first = std::fs::read(config.store_path.as_std_path()).unwrap();
    app.ingest(&NoopSink).unwrap();
    let second = std::fs::read(config.store_path.as_std_path()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn failed_fetch_leaves_store_untouched() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    write_store(&config, &[("1", "Izuku Midoriya", "Heroes")]);
    let before = std::fs::read(config.store_path.as_std_path()).unwrap();

    let app = build_app(config.clone(), None, MockWiki::default());
    let err = app.ingest(&NoopSink).unwrap_err();
    assert_matches!(err, CatalogError::ApiHttp(_));

    let app = build_app(config.clone(), Some(json!(["not", "an", "object"])), MockWiki::default());
    let err = app.ingest(&NoopSink).unwrap_err();
    assert_matches!(err, CatalogError::Parse(_));

    let after = std::fs::read(config.store_path.as_std_path()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn empty_payload_skips_store_write() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    let app = build_app(config.clone(), Some(json!({"heroes": []})), MockWiki::default());

    let result = app.ingest(&NoopSink).unwrap();
    assert!(!result.written);
    assert!(!config.store_path.as_std_path().exists());
}

#[test]
fn download_is_idempotent_across_runs() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    write_store(
        &config,
        &[("1", "Izuku Midoriya", "Heroes"), ("2", "Katsuki Bakugo", "students")],
    );
    let wiki = MockWiki::default()
        .with_portrait("Izuku Midoriya", "https://static.example/deku.png")
        .with_portrait("Katsuki Bakugo", "https://static.example/kacchan.png");
    let app = build_app(config.clone(), None, wiki);

    let first = app.download_portraits(&NoopSink).unwrap();
    assert_eq!(first.count(DownloadAction::Downloaded), 2);
    let requests_after_first = app_requests(&app);
    assert_eq!(requests_after_first, 4);
    assert!(config.image_dir.join("character_1.png").as_std_path().is_file());

    let second = app.download_portraits(&NoopSink).unwrap();
    assert_eq!(second.count(DownloadAction::Present), 2);
    assert_eq!(app_requests(&app), requests_after_first);
}

#[test]
fn existing_asset_is_skipped_without_request() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    write_store(&config, &[("5", "Shoto Todoroki", "Students")]);
    std::fs::create_dir_all(config.image_dir.as_std_path()).unwrap();
    std::fs::write(config.image_dir.join("character_5.png").as_std_path(), b"done").unwrap();

    let app = build_app(config, None, MockWiki::default());
    let result = app.download_portraits(&NoopSink).unwrap();

    assert_eq!(result.items[0].action, DownloadAction::Present);
    assert_eq!(app_requests(&app), 0);
}

#[test]
fn missing_marker_yields_no_image_and_run_continues() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    write_store(
        &config,
        &[("1", "Nameless Extra", "Other"), ("2", "Eijiro Kirishima", "Students")],
    );
    let wiki = MockWiki::default()
        .with_page("Nameless Extra", "<html><body><p>No infobox here</p></body></html>")
        .with_portrait("Eijiro Kirishima", "https://static.example/red.png");
    let app = build_app(config.clone(), None, wiki);

    let result = app.download_portraits(&NoopSink).unwrap();
    assert_eq!(result.items[0].action, DownloadAction::NoImage);
    assert_eq!(result.items[1].action, DownloadAction::Downloaded);

    let downloads = download_urls(&app);
    assert_eq!(downloads, vec!["https://static.example/red.png".to_string()]);
    assert!(!config.image_dir.join("character_1.png").as_std_path().exists());
}

#[test]
fn unreachable_page_is_reported_per_character() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    write_store(
        &config,
        &[("1", "Ghost Page", "Heroes"), ("2", "Tenya Iida", "Students")],
    );
    let wiki = MockWiki::default().with_portrait("Tenya Iida", "https://static.example/iida.png");
    let app = build_app(config, None, wiki);

    let result = app.download_portraits(&NoopSink).unwrap();
    assert_eq!(result.items[0].action, DownloadAction::Failed);
    assert!(result.items[0].message.as_deref().unwrap().contains("404"));
    assert_eq!(result.items[1].action, DownloadAction::Downloaded);
}

#[test]
fn interrupted_download_leaves_no_partial_file() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    write_store(&config, &[("8", "Momo Yaoyorozu", "Students")]);
    let mut wiki = MockWiki::default()
        .with_portrait("Momo Yaoyorozu", "https://static.example/momo.png");
    wiki.broken_streams
        .insert("https://static.example/momo.png".to_string());
    let app = build_app(config.clone(), None, wiki);

    let result = app.download_portraits(&NoopSink).unwrap();
    assert_eq!(result.items[0].action, DownloadAction::Failed);

    let leftovers: Vec<_> = std::fs::read_dir(config.image_dir.as_std_path())
        .unwrap()
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn invalid_records_stay_in_store_but_are_not_processed() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    write_store(
        &config,
        &[
            ("9", "Gentle Criminal", "Sidekicks"),
            ("", "No Id", "Heroes"),
            ("11", "", "Heroes"),
            ("12", "Mirio Togata", "Students"),
            ("12", "Mirio Again", "Students"),
        ],
    );
    let wiki = MockWiki::default()
        .with_portrait("Mirio Togata", "https://static.example/mirio.png");
    let app = build_app(config.clone(), None, wiki);

    let result = app.download_portraits(&NoopSink).unwrap();
    let actions: Vec<_> = result.items.iter().map(|item| item.action).collect();
    assert_eq!(
        actions,
        vec![
            DownloadAction::SkippedInvalid,
            DownloadAction::SkippedInvalid,
            DownloadAction::SkippedInvalid,
            DownloadAction::Downloaded,
            DownloadAction::SkippedInvalid,
        ]
    );
    assert_eq!(
        *app_page_calls(&app),
        vec![format!("{WIKI}/Mirio_Togata")]
    );

    let table = CanonicalStore::new(config.image_dir.clone())
        .read(&config.store_path)
        .unwrap();
    assert_eq!(table.records[0].category(), "Sidekicks");
}

#[test]
fn download_requests_are_paced() {
    let (_temp, root) = temp_root();
    let config = paced_config(&root, 80);
    write_store(
        &config,
        &[
            ("1", "Izuku Midoriya", "Heroes"),
            ("2", "Fumikage Tokoyami", "Students"),
            ("3", "Minoru Mineta", "Students"),
        ],
    );
    std::fs::create_dir_all(config.image_dir.as_std_path()).unwrap();
    std::fs::write(config.image_dir.join("character_1.png").as_std_path(), b"done").unwrap();
    let wiki = MockWiki::default()
        .with_portrait("Fumikage Tokoyami", "https://static.example/dark.png")
        .with_portrait("Minoru Mineta", "https://static.example/grape.png");
    let app = build_app(config.clone(), None, wiki);

    let started = Instant::now();
    let result = app.download_portraits(&NoopSink).unwrap();

    assert_eq!(result.count(DownloadAction::Present), 1);
    assert_eq!(result.count(DownloadAction::Downloaded), 2);
    let times = app.wiki().call_times.lock().unwrap().clone();
    assert_eq!(times.len(), 4);
    assert!(times[0] - started < config.request_delay);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= config.request_delay);
    }
}

#[test]
fn unreachable_page_is_not_reported_as_missing_portrait() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    write_store(&config, &[("1", "Ghost Page", "Heroes")]);
    let app = build_app(config, None, MockWiki::default());
    let sink = RecordingSink::default();

    app.download_portraits(&sink).unwrap();

    let messages = sink.messages.lock().unwrap();
    assert!(
        messages
            .iter()
            .any(|m| m.starts_with("Failed to fetch wiki page for Ghost Page"))
    );
    assert!(!messages.iter().any(|m| m.contains("No image URL found")));
}

#[test]
fn download_without_store_fails() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    let app = build_app(config, None, MockWiki::default());

    let err = app.download_portraits(&NoopSink).unwrap_err();
    assert_matches!(err, CatalogError::StoreNotFound(_));
}

#[test]
fn verify_after_download_is_synced() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    write_store(&config, &[("1", "Izuku Midoriya", "Heroes")]);
    let wiki = MockWiki::default()
        .with_portrait("Izuku Midoriya", "https://static.example/deku.png");
    let app = build_app(config, None, wiki);

    let before = app.verify(&NoopSink).unwrap();
    assert_eq!(before.missing.len(), 1);

    app.download_portraits(&NoopSink).unwrap();
    let after = app.verify(&NoopSink).unwrap();
    assert!(after.is_synced());
}

#[test]
fn inspect_reports_schema_anomalies() {
    let (_temp, root) = temp_root();
    let config = test_config(&root);
    write_store(
        &config,
        &[
            ("1", "Izuku Midoriya", "Heroes"),
            ("1", "Izuku Again", "Heroes"),
            ("", "No Id", "Other"),
            ("4", "Stain", "Sidekicks"),
        ],
    );
    let app = build_app(config, None, MockWiki::default());

    let result = app.inspect(&NoopSink).unwrap();
    assert_eq!(result.records, 4);
    assert_eq!(result.categories.get("Heroes"), Some(&2));
    assert_eq!(result.unknown_categories, 1);
    assert_eq!(result.missing_ids, 1);
    assert_eq!(result.duplicate_ids, vec!["1".to_string()]);
}

fn app_requests(app: &App<MockApi, MockWiki, InfoboxPortraitLocator>) -> usize {
    app.wiki().requests()
}

fn download_urls(app: &App<MockApi, MockWiki, InfoboxPortraitLocator>) -> Vec<String> {
    app.wiki().download_calls.lock().unwrap().clone()
}

fn app_page_calls(app: &App<MockApi, MockWiki, InfoboxPortraitLocator>) -> Vec<String> {
    app.wiki().page_calls.lock().unwrap().clone()
}
