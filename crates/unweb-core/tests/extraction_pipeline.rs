//! End-to-end extraction pipeline: fetch a bundle, discover its map,
//! validate, extract, and reconstruct to disk.

use std::collections::BTreeMap;

use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unweb_core::{
    FetchOptions, Fetcher, Reconstructor, SourceExtractor, SourceMapDiscovery, SourceMapParser,
    bundle_name_from_url,
};

const MAP: &str = r#"{
    "version": 3,
    "file": "main.js",
    "sources": ["webpack:///./src/index.ts", "webpack:///./src/lib/math.ts", "webpack:///./src/no-content.ts"],
    "sourcesContent": ["export const one = 1;\n", "export const add = (a: number, b: number) => a + b;\n", null],
    "names": [],
    "mappings": "AAAA;ACAA"
}"#;

async fn serve_bundle(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/static/js/main.js"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("console.log(1);\n//# sourceMappingURL=main.js.map\n"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/static/js/main.js.map"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MAP))
        .mount(server)
        .await;
}

#[tokio::test]
async fn bundle_to_disk_round_trip() {
    let server = MockServer::start().await;
    serve_bundle(&server).await;

    let fetcher = Fetcher::new().expect("fetcher");
    let bundle_url = format!("{}/static/js/main.js", server.uri());

    // Fetch the bundle and discover its map from the trailing comment.
    let bundle = fetcher
        .fetch(&bundle_url, &FetchOptions::default())
        .await
        .expect("bundle fetch");
    let discovery = SourceMapDiscovery::new(&fetcher);
    let discovered = discovery.discover(&bundle_url, &bundle).await;
    assert!(discovered.found);
    let map_url = discovered.source_map_url.expect("map url");
    assert_eq!(map_url, format!("{}/static/js/main.js.map", server.uri()));

    // Fetch and validate the map.
    let map_bytes = fetcher
        .fetch(&map_url, &FetchOptions::default())
        .await
        .expect("map fetch");
    let outcome = SourceMapParser::new()
        .parse_auto(map_bytes.bytes(), &map_url)
        .expect("map parses");
    assert!(outcome.report.valid, "{:?}", outcome.report);
    let parsed = outcome.map.expect("map present");

    // Extract and write.
    let out = TempDir::new().expect("tempdir");
    let reconstructor = Reconstructor::new(out.path());
    let extractor = SourceExtractor::permissive();
    let bundle_name = bundle_name_from_url(&bundle_url);
    assert_eq!(bundle_name, "js/main");

    let mut manifest = unweb_core::ExtractionManifest::new(server.uri());
    for regular in parsed.regular_maps() {
        let result = extractor.extract(regular, &bundle_url, &map_url, None);
        assert_eq!(result.metadata.extracted_count, 2);
        assert_eq!(result.metadata.null_content_count, 1);

        let stats = reconstructor
            .write_bundle_sources(&bundle_name, &result.sources)
            .await;
        assert_eq!(stats.written, 2);
        assert_eq!(stats.failed, 0);

        let paths: Vec<String> = result.sources.iter().map(|s| s.path.clone()).collect();
        manifest.add_bundle(&bundle_url, Some(map_url.clone()), &paths);

        // Writing the same sources again is a no-op.
        let rerun = reconstructor
            .write_bundle_sources(&bundle_name, &result.sources)
            .await;
        assert_eq!(rerun.written, 0);
        assert_eq!(rerun.unchanged, 2);
    }

    // The webpack paths landed sanitized under the bundle directory.
    let index = out.path().join("js/main/src/index.ts");
    let math = out.path().join("js/main/src/lib/math.ts");
    assert_eq!(
        std::fs::read_to_string(index).expect("index written"),
        "export const one = 1;\n"
    );
    assert!(math.exists());

    // Manifest summarizes the run.
    let manifest_path = reconstructor.write_manifest(&manifest).await.expect("manifest");
    let written: serde_json::Value =
        serde_json::from_slice(&std::fs::read(manifest_path).expect("read")).expect("json");
    assert_eq!(written["totalFiles"], 2);
    assert_eq!(written["byExtension"]["ts"], 2);
    assert_eq!(written["bundles"][0]["filesExtracted"], 2);
}

#[tokio::test]
async fn mapless_bundle_is_mirrored_raw() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets/vendor.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("!function(){}();"))
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/assets/vendor.js.map"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = Fetcher::new().expect("fetcher");
    let bundle_url = format!("{}/assets/vendor.js", server.uri());
    let bundle = fetcher
        .fetch(&bundle_url, &FetchOptions::default())
        .await
        .expect("fetch");

    let discovery = SourceMapDiscovery::new(&fetcher);
    let discovered = discovery.discover(&bundle_url, &bundle).await;
    assert!(!discovered.found);

    let out = TempDir::new().expect("tempdir");
    let reconstructor = Reconstructor::new(out.path());
    let saved = reconstructor
        .save_raw_bundle(&bundle_url, bundle.bytes())
        .await
        .expect("mirror");
    assert_eq!(saved, out.path().join("_bundles/assets/vendor.js"));

    let entry = reconstructor
        .write_entry_file(&[], &["assets/vendor.js".to_string()], false)
        .await
        .expect("entry")
        .expect("written");
    let body = std::fs::read_to_string(entry).expect("read entry");
    assert_eq!(body, "import '../_bundles/assets/vendor.js';\n");
}
