//! End-to-end refresh against an in-process mock catalog and a fake
//! `node_modules` tree.

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use noderef_core::config::{InstallSource, PluginPackage, RefreshConfig};
use noderef_core::refresh;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

async fn official(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let page = params
        .get("pagination[page]")
        .map_or("1", String::as_str)
        .to_string();
    let data = if page == "1" {
        json!([
            {
                "attributes": {
                    "name": "n8n-nodes-base.slack",
                    "displayName": "Slack",
                    "version": 2,
                    "description": "Consume Slack API",
                    "group": ["output"],
                    "codex": { "categories": ["Communication"], "alias": ["chat"] },
                    "iconData": { "type": "file", "fileBuffer": "data:image/svg+xml;base64,AAAA" },
                    "properties": [
                        { "name": "resource", "type": "options", "default": "message", "noDataExpression": true,
                          "options": [{ "name": "Message", "value": "message", "action": "Send" }] }
                    ]
                }
            },
            {
                "attributes": {
                    "name": "n8n-nodes-base.set",
                    "displayName": "Edit Fields (Set)",
                    "version": 3,
                    "properties": []
                }
            }
        ])
    } else {
        json!([
            {
                "attributes": {
                    "name": "n8n-nodes-base.code",
                    "displayName": "Code",
                    "version": 2,
                    "properties": [{ "name": "jsCode", "type": "string", "default": "", "typeOptions": { "editor": "codeNodeEditor" } }]
                }
            },
            { "attributes": { "displayName": "Nameless", "version": 1 } },
            { "attributes": { "name": "n8n-nodes-base.noOp", "displayName": "No Operation, do nothing", "version": null } }
        ])
    };
    Json(json!({ "data": data, "meta": { "pagination": { "page": page, "pageCount": 2 } } }))
}

async fn community() -> Json<Value> {
    Json(json!({
        "data": [
            {
                "attributes": {
                    "name": "n8n-nodes-foo.foo",
                    "displayName": "Foo",
                    "packageName": "n8n-nodes-foo",
                    "isOfficialNode": false,
                    "nodeDescription": {
                        "version": 1,
                        "properties": [{ "name": "bar", "type": "string", "placeholder": "x" }]
                    }
                }
            },
            {
                "attributes": {
                    "name": "n8n-nodes-bar.bar",
                    "displayName": "bar",
                    "packageName": "n8n-nodes-bar",
                    "isOfficialNode": true,
                    "nodeDescription": { "version": [1, 1.1] }
                }
            }
        ]
    }))
}

async fn broken() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn serve() -> SocketAddr {
    let app = Router::new()
        .route("/api/nodes", get(official))
        .route("/api/community-nodes", get(community))
        .route("/broken", get(broken));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

const SLACK_JS: &str = r"
class Slack {
    constructor() {
        this.description = {
            displayName: 'Slack',
            name: 'slack',
            group: ['output'],
            version: [2, 2.1, 2.2],
            defaults: { name: 'Slack' },
        };
    }
}
exports.Slack = Slack;
";

const SET_JS: &str = r"
class Set extends n8n_workflow_1.VersionedNodeType {
    constructor() {
        const baseDescription = {
            displayName: 'Edit Fields (Set)',
            name: 'set',
            group: ['input'],
            description: 'Modify, add, or remove item fields',
            defaultVersion: 3.4,
        };
        const nodeVersions = { 3: new SetV2(baseDescription), 3.4: new SetV2(baseDescription) };
        super(nodeVersions, baseDescription);
    }
}
exports.Set = Set;
";

fn fake_node_modules(root: &Path) {
    let base = root.join("n8n-nodes-base");
    fs::create_dir_all(base.join("dist/nodes/Slack")).unwrap();
    fs::create_dir_all(base.join("dist/nodes/Set")).unwrap();
    fs::write(
        base.join("package.json"),
        json!({
            "name": "n8n-nodes-base",
            "version": "1.80.0",
            "n8n": { "nodes": ["dist/nodes/Slack/Slack.node.js", "dist/nodes/Set/Set.node.js", "dist/nodes/Gone/Gone.node.js"] }
        })
        .to_string(),
    )
    .unwrap();
    fs::write(base.join("dist/nodes/Slack/Slack.node.js"), SLACK_JS).unwrap();
    fs::write(base.join("dist/nodes/Set/Set.node.js"), SET_JS).unwrap();
}

fn config(addr: SocketAddr, modules: &Path, out: &Path) -> RefreshConfig {
    RefreshConfig {
        official_url: format!("http://{addr}/api/nodes"),
        community_url: format!("http://{addr}/api/community-nodes"),
        out_dir: out.to_path_buf(),
        packages: vec![
            PluginPackage::new("n8n-nodes-base"),
            PluginPackage::new("@n8n/n8n-nodes-langchain"),
        ],
        install: InstallSource::Existing(modules.to_path_buf()),
        dynamic: false,
        ..RefreshConfig::default()
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn node<'a>(index: &'a Value, name: &str) -> &'a Value {
    index["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["name"] == name)
        .unwrap_or_else(|| panic!("{name} missing from index"))
}

#[tokio::test]
async fn test_refresh_writes_cache() {
    let addr = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let modules = dir.path().join("node_modules");
    let out = dir.path().join("cache");
    fake_node_modules(&modules);

    let summary = refresh::run(&config(addr, &modules, &out)).await.unwrap();

    assert_eq!(summary.official.pages, 2);
    assert_eq!(summary.official.fetched, 5);
    assert_eq!(summary.official.written, 4);
    assert_eq!(summary.official.dropped, 1);
    assert_eq!(summary.community.written, 2);
    assert_eq!(summary.overrides.total, 2);
    assert_eq!(summary.overrides.static_count, 2);
    assert_eq!(summary.overrides.dynamic, 0);

    let base = &summary.packages[0];
    assert_eq!((base.files, base.static_count, base.failed), (3, 2, 1));
    assert!(summary.packages[1].error.is_some());

    let index = read_json(&out.join("official-nodes.json"));
    assert_eq!(index["_meta"]["total"], 4);
    assert_eq!(index["_meta"]["source"], format!("http://{addr}/api/nodes"));
    assert_eq!(node(&index, "n8n-nodes-base.slack")["version"], json!(2.2));
    assert_eq!(node(&index, "n8n-nodes-base.set")["version"], json!(3.4));
    assert_eq!(node(&index, "n8n-nodes-base.code")["version"], json!(2));
    assert!(node(&index, "n8n-nodes-base.noOp")["version"].is_null());
    assert_eq!(node(&index, "n8n-nodes-base.slack")["categories"], json!(["Communication"]));
    assert!(node(&index, "n8n-nodes-base.slack").get("iconData").is_none());

    let names: Vec<&str> = index["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["displayName"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Code", "Edit Fields (Set)", "No Operation, do nothing", "Slack"]);

    let community = read_json(&out.join("community-nodes.json"));
    let bar = node(&community, "n8n-nodes-bar.bar");
    assert_eq!(bar["version"], json!(1.1));
    assert_eq!(bar["packageName"], "n8n-nodes-bar");
    assert_eq!(bar["isOfficialNode"], true);
    assert!(bar.get("group").is_none());
}

#[tokio::test]
async fn test_properties_log_shape() {
    let addr = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let modules = dir.path().join("node_modules");
    let out = dir.path().join("cache");
    fake_node_modules(&modules);

    let summary = refresh::run(&config(addr, &modules, &out)).await.unwrap();
    assert_eq!(summary.property_records, 3);

    let log = fs::read_to_string(out.join("node-properties.jsonl")).unwrap();
    let lines: Vec<Value> = log
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let nodes: Vec<&str> = lines.iter().map(|l| l["node"].as_str().unwrap()).collect();
    assert_eq!(
        nodes,
        vec!["n8n-nodes-base.code", "n8n-nodes-base.slack", "n8n-nodes-foo.foo"]
    );
    for line in &lines {
        let mut keys: Vec<&String> = line.as_object().unwrap().keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["node", "properties"]);
    }
    assert_eq!(
        lines[1]["properties"],
        json!([{ "name": "resource", "type": "options", "default": "message",
                 "options": [{ "name": "Message", "value": "message" }] }])
    );
    assert!(!log.contains("typeOptions"));
    assert!(!log.contains("n8n-nodes-bar.bar"));
}

#[tokio::test]
async fn test_rerun_is_byte_identical() {
    let addr = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let modules = dir.path().join("node_modules");
    let out = dir.path().join("cache");
    fake_node_modules(&modules);
    let config = config(addr, &modules, &out);

    let first = refresh::run(&config).await.unwrap();
    let snapshot: Vec<Vec<u8>> = first
        .artifacts
        .iter()
        .map(|a| fs::read(&a.path).unwrap())
        .collect();

    let second = refresh::run(&config).await.unwrap();
    assert!(second.artifacts.iter().all(|a| !a.changed));
    for (artifact, before) in second.artifacts.iter().zip(snapshot) {
        assert_eq!(fs::read(&artifact.path).unwrap(), before);
    }
}

#[tokio::test]
async fn test_zero_overrides_still_writes_cache() {
    let addr = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let modules = dir.path().join("empty_modules");
    let out = dir.path().join("cache");
    fs::create_dir_all(&modules).unwrap();

    let summary = refresh::run(&config(addr, &modules, &out)).await.unwrap();
    assert_eq!(summary.overrides.total, 0);

    let index = read_json(&out.join("official-nodes.json"));
    assert_eq!(node(&index, "n8n-nodes-base.slack")["version"], json!(2));
    assert_eq!(node(&index, "n8n-nodes-base.set")["version"], json!(3));
}

#[tokio::test]
async fn test_transport_failure_leaves_previous_cache() {
    let addr = serve().await;
    let dir = tempfile::tempdir().unwrap();
    let modules = dir.path().join("node_modules");
    let out = dir.path().join("cache");
    fake_node_modules(&modules);

    refresh::run(&config(addr, &modules, &out)).await.unwrap();
    let before = fs::read(out.join("official-nodes.json")).unwrap();

    let mut broken = config(addr, &modules, &out);
    broken.community_url = format!("http://{addr}/broken");
    broken.official_url = format!("http://{addr}/broken");
    let err = refresh::run(&broken).await.unwrap_err();
    assert!(err.is_transport());
    assert!(err.to_string().contains("500"));

    assert_eq!(fs::read(out.join("official-nodes.json")).unwrap(), before);
}
