//! Integration tests for the graph client over HTTP using wiremock
//!
//! These tests drive `HttpTransport` and `Client` against mocked Redfish
//! endpoints, covering decoding, lazy relations, error mapping and writes.

use futures::StreamExt;
use rfgraph::model::{AssemblyData, CompositionService, Health, State};
use rfgraph::{
    CacheConfig, Client, HttpTransport, Locator, Reference, ResolveError, ResourceKind, WalkItem,
    WalkOptions,
};
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;
use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> Client {
    let base = Url::parse(&server.uri()).unwrap();
    let transport = HttpTransport::new(base.clone()).unwrap();
    Client::new(base, Arc::new(transport), CacheConfig::default())
}

async fn serve(server: &MockServer, at: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn assembly() -> Value {
    json!({
        "@odata.id": "/redfish/v1/Assembly/1",
        "@odata.context": "/redfish/v1/$metadata#Assembly.Assembly",
        "@odata.type": "#Assembly.v1_2_1.Assembly",
        "Assemblies": [
            {
                "@odata.id": "/redfish/v1/Assembly/1/AssemblyData",
                "MemberId": "1",
                "Model": "AssemblyOne",
                "Name": "Assembly One"
            }
        ],
        "Assemblies@odata.count": 1,
        "Description": "Assembly Description",
        "Id": "1",
        "Name": "Assembly One"
    })
}

fn assembly_data() -> Value {
    json!({
        "@odata.id": "/redfish/v1/Assembly/1/AssemblyData",
        "BinaryDataURI": "/image/path",
        "Description": "Assembly Description",
        "EngineeringChangeLevel": "1.2.3",
        "MemberId": "1",
        "Model": "AssemblyOne",
        "Name": "Assembly One",
        "PartNumber": "Assembly Part",
        "PhysicalContext": "ContextInfo",
        "Producer": "Vendor One",
        "ProductionDate": "2013-09-11T17:03:55+00:00",
        "SKU": "1234",
        "SerialNumber": "12345",
        "SparePartNumber": "12345-1234",
        "Status": {"State": "Enabled", "Health": "OK", "HealthRollup": "OK"},
        "Vendor": "Vendor One",
        "Version": "1.2.3.4"
    })
}

fn composition_service() -> Value {
    json!({
        "@odata.context": "/redfish/v1/$metadata#CompositionService.CompositionService",
        "@odata.type": "#CompositionService.v1_0_0.CompositionService",
        "@odata.id": "/redfish/v1/CompositionService",
        "Id": "CompositionService-1",
        "Name": "Composition Service",
        "Description": "Composition Service",
        "Status": {"State": "Enabled", "Health": "OK"},
        "AllowOverprovisioning": true,
        "AllowZoneAffinity": false,
        "ServiceEnabled": true,
        "ResourceBlocks": {"@odata.id": "/redfish/v1/CompositionService/ResourceBlocks"},
        "ResourceZones": {"@odata.id": "/redfish/v1/CompositionService/ResourceZones"}
    })
}

/// End-to-end decoding of the assembly and composition fixtures
mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_assembly_lists_its_members() {
        let server = MockServer::start().await;
        serve(&server, "/redfish/v1/Assembly/1", assembly()).await;
        let client = client_for(&server);

        let entity = client
            .resolve(&Reference::from("/redfish/v1/Assembly/1"), ResourceKind::Assembly)
            .await
            .expect("Assembly should resolve");

        assert_eq!(entity.id, "1");
        assert_eq!(entity.name, "Assembly One");

        let assemblies = entity.collection("Assemblies").expect("inline collection");
        assert_eq!(assemblies.declared_count, 1);
        let members: Vec<&str> = assemblies.iter().map(|r| r.locator().as_str()).collect();
        assert_eq!(members, vec!["/redfish/v1/Assembly/1/AssemblyData"]);

        let typed: &rfgraph::model::Assembly = entity.as_kind().unwrap();
        assert_eq!(&typed.assemblies, assemblies);
    }

    #[tokio::test]
    async fn test_assembly_member_resolves_to_assembly_data() {
        let server = MockServer::start().await;
        serve(&server, "/redfish/v1/Assembly/1", assembly()).await;
        serve(&server, "/redfish/v1/Assembly/1/AssemblyData", assembly_data()).await;
        let client = client_for(&server);

        let assembly = client
            .resolve_any(&Reference::from("/redfish/v1/Assembly/1"))
            .await
            .unwrap();
        let member = assembly.collection("Assemblies").unwrap().get(0).unwrap();

        let entity = client
            .resolve(member, ResourceKind::AssemblyData)
            .await
            .expect("AssemblyData should resolve");
        let data: &AssemblyData = entity.as_kind().unwrap();

        assert_eq!(data.member_id, "1");
        assert_eq!(data.model, "AssemblyOne");
        assert_eq!(data.binary_data_uri, "/image/path");
        assert_eq!(data.sku, "1234");
        assert_eq!(
            data.production_date.map(|d| d.to_rfc3339()).as_deref(),
            Some("2013-09-11T17:03:55+00:00")
        );

        let status = entity.status.as_ref().unwrap();
        assert_eq!(status.state, Some(State::Enabled));
        assert_eq!(status.health, Some(Health::OK));
        assert_eq!(status.health_rollup, Some(Health::OK));
    }

    #[tokio::test]
    async fn test_composition_service_relations_are_not_fetched() {
        let server = MockServer::start().await;
        serve(&server, "/redfish/v1/CompositionService", composition_service()).await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/CompositionService/ResourceBlocks"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let client = client_for(&server);

        let entity = client
            .resolve(
                &Reference::from("/redfish/v1/CompositionService"),
                ResourceKind::CompositionService,
            )
            .await
            .unwrap();
        let service: &CompositionService = entity.as_kind().unwrap();

        assert_eq!(entity.id, "CompositionService-1");
        assert!(service.allow_overprovisioning);
        assert!(!service.allow_zone_affinity);
        assert!(service.service_enabled);
        assert_eq!(
            service.resource_blocks.as_ref().map(|r| r.locator().as_str()),
            Some("/redfish/v1/CompositionService/ResourceBlocks")
        );
        assert_eq!(
            entity.reference("ResourceZones").map(|r| r.locator().as_str()),
            Some("/redfish/v1/CompositionService/ResourceZones")
        );

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn test_resource_blocks_resolve_on_demand() {
        let server = MockServer::start().await;
        serve(&server, "/redfish/v1/CompositionService", composition_service()).await;
        serve(
            &server,
            "/redfish/v1/CompositionService/ResourceBlocks",
            json!({
                "@odata.id": "/redfish/v1/CompositionService/ResourceBlocks",
                "@odata.type": "#ResourceBlockCollection.ResourceBlockCollection",
                "Name": "Resource Block Collection",
                "Members@odata.count": 2,
                "Members": [
                    {"@odata.id": "/redfish/v1/CompositionService/ResourceBlocks/ComputeBlock"},
                    {"@odata.id": "/redfish/v1/CompositionService/ResourceBlocks/DrivesBlock"}
                ]
            }),
        )
        .await;
        let client = client_for(&server);

        let service = client
            .resolve_any(&Reference::from("/redfish/v1/CompositionService"))
            .await
            .unwrap();
        let blocks = client
            .follow_collection(&service, "ResourceBlocks")
            .await
            .unwrap();

        assert_eq!(blocks.declared_count, 2);
        assert_eq!(blocks.get(1).unwrap().locator().leaf(), "DrivesBlock");
    }
}

/// Status codes and malformed documents
mod error_tests {
    use super::*;

    #[tokio::test]
    async fn test_404_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Chassis/9"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "Base.1.0.ResourceMissingAtURI", "message": "not found"}
            })))
            .mount(&server)
            .await;
        let client = client_for(&server);

        let err = client
            .resolve_any(&Reference::from("/redfish/v1/Chassis/9"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert_eq!(err.locator(), Some(&Locator::new("/redfish/v1/Chassis/9")));
        assert!(err.to_string().contains("/redfish/v1/Chassis/9"));
    }

    #[tokio::test]
    async fn test_failures_are_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Managers/1"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);
        let reference = Reference::from("/redfish/v1/Managers/1");

        let first = client.resolve_any(&reference).await.unwrap_err();
        let second = client.resolve_any(&reference).await.unwrap_err();
        assert_eq!(first, second);
        assert!(first.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_json_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"@odata.id\": "))
            .mount(&server)
            .await;
        let client = client_for(&server);

        let err = client
            .resolve_any(&Reference::from("/redfish/v1/Systems/1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Decode { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_collection_count_mismatch() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/redfish/v1/Chassis",
            json!({
                "@odata.id": "/redfish/v1/Chassis",
                "Members@odata.count": 2,
                "Members": [{"@odata.id": "/redfish/v1/Chassis/1"}]
            }),
        )
        .await;
        let client = client_for(&server);

        let err = client
            .resolve_collection(&Reference::from("/redfish/v1/Chassis"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ResolveError::CountMismatch {
                locator: Locator::new("/redfish/v1/Chassis"),
                declared: 2,
                actual: 1,
            }
        );
    }
}

/// Link normalization and paging
mod link_tests {
    use super::*;

    #[tokio::test]
    async fn test_absolute_links_share_a_cache_entry() {
        let server = MockServer::start().await;
        let absolute = format!("{}/redfish/v1/Chassis/1/", server.uri());
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Chassis/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.id": absolute,
                "@odata.type": "#Chassis.v1_14_0.Chassis",
                "Id": "1"
            })))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);

        let via_path = client.locate("/redfish/v1/Chassis/1/").unwrap();
        let via_url = client.locate(&absolute).unwrap();
        assert_eq!(via_path, via_url);

        let entity = client.resolve_any(&Reference::new(via_path)).await.unwrap();
        assert_eq!(entity.locator.as_str(), "/redfish/v1/Chassis/1");
        client.resolve_any(&Reference::new(via_url)).await.unwrap();
    }

    #[tokio::test]
    async fn test_next_links_are_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .and(query_param_is_missing("$skip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.id": "/redfish/v1/Systems",
                "Members@odata.count": 3,
                "Members": [
                    {"@odata.id": "/redfish/v1/Systems/1"},
                    {"@odata.id": "/redfish/v1/Systems/2"}
                ],
                "Members@odata.nextLink": "/redfish/v1/Systems?$skip=2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/Systems"))
            .and(query_param("$skip", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.id": "/redfish/v1/Systems",
                "Members": [{"@odata.id": "/redfish/v1/Systems/3"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);

        let systems = client
            .resolve_collection(&Reference::from("/redfish/v1/Systems"))
            .await
            .unwrap();
        let leaves: Vec<&str> = systems.iter().map(|r| r.locator().leaf()).collect();
        assert_eq!(leaves, vec!["1", "2", "3"]);
    }
}

/// Writes and credentials
mod write_tests {
    use super::*;

    #[tokio::test]
    async fn test_update_sends_if_match_and_refetches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1/CompositionService"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(composition_service())
                    .insert_header("ETag", "W/\"17\""),
            )
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/redfish/v1/CompositionService"))
            .and(header("If-Match", "W/\"17\""))
            .and(body_json(json!({"ServiceEnabled": false})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);
        let reference = Reference::from("/redfish/v1/CompositionService");

        let service = client.resolve_any(&reference).await.unwrap();
        assert_eq!(service.etag.as_deref(), Some("W/\"17\""));

        client
            .update(&service, &json!({"ServiceEnabled": false}))
            .await
            .expect("PATCH should succeed");
        client.resolve_any(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn test_precondition_failure_is_reported() {
        let server = MockServer::start().await;
        serve(&server, "/redfish/v1/CompositionService", composition_service()).await;
        Mock::given(method("PATCH"))
            .and(path("/redfish/v1/CompositionService"))
            .respond_with(ResponseTemplate::new(412))
            .mount(&server)
            .await;
        let client = client_for(&server);

        let service = client
            .resolve_any(&Reference::from("/redfish/v1/CompositionService"))
            .await
            .unwrap();
        let err = client
            .update(&service, &json!({"AllowZoneAffinity": true}))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(412));
    }

    #[tokio::test]
    async fn test_basic_auth_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/redfish/v1"))
            .and(header("Authorization", "Basic YWRtaW46c2VjcmV0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@odata.id": "/redfish/v1",
                "@odata.type": "#ServiceRoot.v1_5_0.ServiceRoot",
                "Id": "RootService",
                "RedfishVersion": "1.6.0"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let transport = HttpTransport::new(base.clone())
            .unwrap()
            .with_basic_auth("admin", Some("secret"));
        let client = Client::new(base, Arc::new(transport), CacheConfig::default());

        let root = client.load_root("/redfish/v1").await.unwrap();
        assert_eq!(root.kind(), ResourceKind::ServiceRoot);
    }
}

/// Walking a small service end to end
mod walk_tests {
    use super::*;

    #[tokio::test]
    async fn test_walk_expands_collections_in_place() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/redfish/v1",
            json!({
                "@odata.id": "/redfish/v1",
                "@odata.type": "#ServiceRoot.v1_5_0.ServiceRoot",
                "Id": "RootService",
                "Chassis": {"@odata.id": "/redfish/v1/Chassis"}
            }),
        )
        .await;
        serve(
            &server,
            "/redfish/v1/Chassis",
            json!({
                "@odata.id": "/redfish/v1/Chassis",
                "Members@odata.count": 1,
                "Members": [{"@odata.id": "/redfish/v1/Chassis/1"}]
            }),
        )
        .await;
        serve(
            &server,
            "/redfish/v1/Chassis/1",
            json!({
                "@odata.id": "/redfish/v1/Chassis/1",
                "@odata.type": "#Chassis.v1_14_0.Chassis",
                "Id": "1",
                "Assembly": {"@odata.id": "/redfish/v1/Assembly/1"}
            }),
        )
        .await;
        serve(&server, "/redfish/v1/Assembly/1", assembly()).await;
        serve(&server, "/redfish/v1/Assembly/1/AssemblyData", assembly_data()).await;
        let client = client_for(&server);

        let items: Vec<WalkItem> = client
            .walk(
                Reference::from("/redfish/v1"),
                WalkOptions::default().with_max_depth(3),
            )
            .collect()
            .await;

        let seen: Vec<(String, usize)> = items
            .iter()
            .map(|item| (item.path().to_string(), item.depth()))
            .collect();
        assert_eq!(
            seen,
            vec![
                ("".to_string(), 0),
                ("Chassis[0]".to_string(), 1),
                ("Chassis[0]/Assembly".to_string(), 2),
                ("Chassis[0]/Assembly/Assemblies[0]".to_string(), 3),
            ]
        );
        assert!(items.iter().all(|item| matches!(item, WalkItem::Node { .. })));
    }
}
