//! Gateway service integration tests.
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::{mpsc, oneshot};
use tr_core::{EntityClass, EntityId, Observation, Position, Region};
use tr_gateway::api::{
    ConnectRemoteModelRequest, CreateEntityRequest, EntityIdRequest, ExecuteAgentActionRequest,
    RegionRequest, SpectatorRequest, SubscriptionRequest,
};
use tr_gateway::identity::{AUTH_SECRET_HEADER, MOCK_SECRET, MOCK_USER_ID, MODEL_NAME_HEADER, USERINFO_HEADER};
use tr_gateway::{EnvironmentService, GatewayError, Metadata, StatusCode, StreamEnd};
use tr_simulation::{Mode, SimConfig, Simulation, SpectateEvent};

fn service(mode: Mode) -> EnvironmentService {
    let config = SimConfig::default()
        .with_mode(mode)
        .with_seed(17)
        .with_food_spawn_batch(0);
    let sim = Simulation::new(config).unwrap().into_shared();
    EnvironmentService::new(sim, mode)
}

fn mock() -> Metadata {
    Metadata::new().with(AUTH_SECRET_HEADER, MOCK_SECRET)
}

fn userinfo(id: &str, role: Option<&str>) -> Metadata {
    let json = match role {
        Some(role) => format!(r#"{{"id":"{id}","role":"{role}"}}"#),
        None => format!(r#"{{"id":"{id}"}}"#),
    };
    Metadata::new().with(USERINFO_HEADER, STANDARD.encode(json))
}

fn agent_at(x: i32, y: i32) -> CreateEntityRequest {
    CreateEntityRequest {
        class: EntityClass::Agent,
        position: Position::new(x, y),
        model_name: Some("forager".to_string()),
    }
}

fn food_at(x: i32, y: i32) -> CreateEntityRequest {
    CreateEntityRequest {
        class: EntityClass::Food,
        position: Position::new(x, y),
        model_name: None,
    }
}

fn action(id: EntityId, verb: &str, direction: &str) -> ExecuteAgentActionRequest {
    ExecuteAgentActionRequest {
        id,
        action: verb.to_string(),
        direction: direction.to_string(),
    }
}

#[tokio::test]
async fn spawn_collision() {
    let svc = service(Mode::Training);
    let first = svc.create_entity(&mock(), agent_at(1, 1)).await.unwrap();
    assert_eq!(first.id, EntityId(1));
    let err = svc.create_entity(&mock(), agent_at(1, 1)).await.unwrap_err();
    assert_eq!(err, GatewayError::PositionTaken(Position::new(1, 1)));
    assert_eq!(err.status(), StatusCode::AlreadyExists);
}

#[tokio::test]
async fn created_agent_belongs_to_caller() {
    let svc = service(Mode::Training);
    let id = svc.create_entity(&mock(), agent_at(0, 0)).await.unwrap().id;
    let entity = svc.get_entity(&mock(), EntityIdRequest { id }).await.unwrap();
    assert_eq!(entity.owner_id, MOCK_USER_ID);
    assert_eq!(entity.model_name, "forager");
}

#[tokio::test]
async fn move_blocks_on_food() {
    let svc = service(Mode::Testing);
    svc.create_entity(&mock(), food_at(0, 1)).await.unwrap();
    let agent = svc.create_entity(&mock(), agent_at(0, 0)).await.unwrap().id;

    let outcome = svc
        .execute_agent_action(&mock(), action(agent, "MOVE", "UP"))
        .await
        .unwrap();
    assert!(!outcome.was_successful);
    assert!(outcome.is_alive);

    let entity = svc.get_entity(&mock(), EntityIdRequest { id: agent }).await.unwrap();
    assert_eq!(entity.position, Position::new(0, 0));
    assert_eq!(entity.energy, 100);
}

#[tokio::test]
async fn consume_flow_notifies_spectators() {
    let svc = service(Mode::Testing);
    let agent = svc.create_entity(&mock(), agent_at(0, 0)).await.unwrap().id;
    let food = svc.create_entity(&mock(), food_at(1, 0)).await.unwrap().id;
    {
        let mut sim = svc.simulation().lock().await;
        for _ in 0..5 {
            sim.step_agents().unwrap();
        }
        assert_eq!(sim.get_entity(agent).unwrap().energy, 90);
    }
    for _ in 0..5 {
        svc.step_world(&mock()).await.unwrap();
    }

    let mut stream = svc
        .create_spectator(&mock(), SpectatorRequest { spectator_id: "watcher".into() })
        .await
        .unwrap();
    svc.subscribe_spectator_to_region(
        &mock(),
        SubscriptionRequest {
            spectator_id: "watcher".into(),
            region: Region::new(0, 0),
        },
    )
    .await
    .unwrap();
    while stream.try_next().is_some() {}

    let outcome = svc
        .execute_agent_action(&mock(), action(agent, "consume", "right"))
        .await
        .unwrap();
    assert!(outcome.was_successful);

    let entity = svc.get_entity(&mock(), EntityIdRequest { id: agent }).await.unwrap();
    assert_eq!(entity.energy, 90);
    let missing = svc.get_entity(&mock(), EntityIdRequest { id: food }).await;
    assert_eq!(missing.unwrap_err().status(), StatusCode::NotFound);

    let event = stream.try_next().unwrap();
    let update = event.as_cell_update().unwrap();
    assert_eq!(update.position, Position::new(1, 0));
    assert!(update.occupant.is_none());
    stream.close().await;
}

#[tokio::test]
async fn unknown_verb_is_unsuccessful_and_bad_direction_is_an_error() {
    let svc = service(Mode::Testing);
    let agent = svc.create_entity(&mock(), agent_at(0, 0)).await.unwrap().id;

    let outcome = svc
        .execute_agent_action(&mock(), action(agent, "DANCE", "LEFT"))
        .await
        .unwrap();
    assert!(!outcome.was_successful);

    let err = svc
        .execute_agent_action(&mock(), action(agent, "MOVE", "NORTH"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::InvalidArgument);

    let err = svc
        .execute_agent_action(&mock(), action(EntityId(404), "MOVE", "UP"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NotFound);
}

#[tokio::test]
async fn only_agents_can_act() {
    let svc = service(Mode::Testing);
    let food = svc.create_entity(&mock(), food_at(2, 2)).await.unwrap().id;
    let err = svc
        .execute_agent_action(&mock(), action(food, "MOVE", "UP"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::InvalidArgument);
    let entity = svc.get_entity(&mock(), EntityIdRequest { id: food }).await.unwrap();
    assert_eq!(entity.position, Position::new(2, 2));
}

#[tokio::test]
async fn starving_agent_reports_its_last_action_unsuccessful() {
    let svc = service(Mode::Training);
    let agent = svc.create_entity(&mock(), agent_at(0, 0)).await.unwrap().id;
    let mut last = None;
    for turn in 0..100 {
        let direction = if turn % 2 == 0 { "RIGHT" } else { "LEFT" };
        let outcome = svc
            .execute_agent_action(&mock(), action(agent, "MOVE", direction))
            .await
            .unwrap();
        if !outcome.is_alive {
            last = Some(outcome);
            break;
        }
        assert!(outcome.was_successful);
    }
    let last = last.unwrap();
    assert!(!last.was_successful);
    let err = svc.get_entity(&mock(), EntityIdRequest { id: agent }).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::NotFound);
}

#[tokio::test]
async fn calls_need_identity() {
    let svc = service(Mode::Training);
    let err = svc
        .create_entity(&Metadata::new(), agent_at(0, 0))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::Unauthenticated);

    let wrong = Metadata::new().with(AUTH_SECRET_HEADER, "guess");
    let err = svc.reset_world(&wrong).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::Unauthenticated);
}

#[tokio::test]
async fn agents_need_a_model_name() {
    let svc = service(Mode::Training);
    let mut req = agent_at(0, 0);
    req.model_name = None;
    let err = svc.create_entity(&mock(), req).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::InvalidArgument);
}

#[tokio::test]
async fn observation_in_training_and_denied_in_prod() {
    let svc = service(Mode::Training);
    let agent = svc.create_entity(&mock(), agent_at(2, 2)).await.unwrap().id;
    svc.create_entity(&mock(), food_at(3, 2)).await.unwrap();

    let observation = svc
        .get_agent_observation(&mock(), EntityIdRequest { id: agent })
        .await
        .unwrap();
    assert!(observation.is_alive);
    assert_eq!(observation.cells.len(), 8);
    assert_eq!(observation.cells[4].class(), Some(EntityClass::Food));

    let gone = svc
        .get_agent_observation(&mock(), EntityIdRequest { id: EntityId(99) })
        .await
        .unwrap();
    assert!(!gone.is_alive);
    assert_eq!((gone.energy, gone.health), (0, 0));

    let prod = service(Mode::Prod);
    let err = prod
        .get_agent_observation(&userinfo("alice", None), EntityIdRequest { id: agent })
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::PermissionDenied);
}

#[tokio::test]
async fn prod_requires_connected_model_for_agents() {
    let svc = service(Mode::Prod);
    let alice = userinfo("alice", None);

    let err = svc.create_entity(&alice, agent_at(0, 0)).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::PermissionDenied);

    let stream = svc
        .connect_remote_model(&alice, ConnectRemoteModelRequest { model_name: Some("forager".into()) })
        .await
        .unwrap();
    let id = svc.create_entity(&alice, agent_at(0, 0)).await.unwrap().id;

    // Bob cannot drive Alice's agent, nor spawn on her model.
    let bob = userinfo("bob", None);
    let err = svc
        .execute_agent_action(&bob, action(id, "MOVE", "UP"))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::PermissionDenied);
    let err = svc.create_entity(&bob, agent_at(5, 5)).await.unwrap_err();
    assert_eq!(err.status(), StatusCode::PermissionDenied);

    let outcome = svc
        .execute_agent_action(&alice, action(id, "MOVE", "UP"))
        .await
        .unwrap();
    assert!(outcome.was_successful);
    stream.close().await;
}

#[tokio::test]
async fn prod_restricts_world_operations_to_admins() {
    let svc = service(Mode::Prod);
    let user = userinfo("alice", None);
    let admin = userinfo("root", Some("admin"));

    assert_eq!(
        svc.reset_world(&user).await.unwrap_err().status(),
        StatusCode::PermissionDenied
    );
    assert_eq!(
        svc.create_entity(&user, food_at(1, 1)).await.unwrap_err().status(),
        StatusCode::PermissionDenied
    );
    let food = svc.create_entity(&admin, food_at(1, 1)).await.unwrap().id;
    assert_eq!(
        svc.delete_entity(&user, EntityIdRequest { id: food })
            .await
            .unwrap_err()
            .status(),
        StatusCode::PermissionDenied
    );
    assert_eq!(
        svc.step_world(&user).await.unwrap_err().status(),
        StatusCode::PermissionDenied
    );
    assert_eq!(svc.reset_world(&admin).await.unwrap().removed, 1);
    assert_eq!(
        svc.reset_world(&mock()).await.unwrap_err().status(),
        StatusCode::Unauthenticated
    );
}

#[tokio::test]
async fn delete_reports_count() {
    let svc = service(Mode::Training);
    let id = svc.create_entity(&mock(), food_at(3, 3)).await.unwrap().id;
    assert_eq!(svc.delete_entity(&mock(), EntityIdRequest { id }).await.unwrap().deleted, 1);
    assert_eq!(svc.delete_entity(&mock(), EntityIdRequest { id }).await.unwrap().deleted, 0);
}

#[tokio::test]
async fn entities_in_region_lists_region_only() {
    let svc = service(Mode::Training);
    svc.create_entity(&mock(), food_at(3, 3)).await.unwrap();
    svc.create_entity(&mock(), food_at(-3, 3)).await.unwrap();
    let listed = svc
        .get_entities_in_region(&mock(), RegionRequest { region: Region::new(-1, 0) })
        .await
        .unwrap();
    assert_eq!(listed.entities.len(), 1);
    assert_eq!(listed.entities[0].position, Position::new(-3, 3));
}

#[tokio::test]
async fn duplicate_model_session_is_rejected() {
    let svc = service(Mode::Training);
    let md = mock().with(MODEL_NAME_HEADER, "forager");
    let first = svc
        .connect_remote_model(&md, ConnectRemoteModelRequest::default())
        .await
        .unwrap();
    assert_eq!(first.key().owner_id, MOCK_USER_ID);
    assert_eq!(first.key().model_name, "forager");

    let err = svc
        .connect_remote_model(&md, ConnectRemoteModelRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::AlreadyExists);

    first.close().await;
    let again = svc
        .connect_remote_model(&md, ConnectRemoteModelRequest::default())
        .await;
    assert!(again.is_ok());
}

#[tokio::test]
async fn model_name_is_required() {
    let svc = service(Mode::Training);
    let err = svc
        .connect_remote_model(&mock(), ConnectRemoteModelRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::InvalidArgument);
}

#[tokio::test]
async fn agent_step_feeds_model_stream() {
    let svc = service(Mode::Training);
    let mut stream = svc
        .connect_remote_model(&mock(), ConnectRemoteModelRequest { model_name: Some("forager".into()) })
        .await
        .unwrap();
    let agent = svc.create_entity(&mock(), agent_at(4, 4)).await.unwrap().id;
    svc.step_world(&mock()).await.unwrap();

    let observation = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(observation.id, agent);
    assert!(observation.is_alive);
    assert_eq!((observation.energy, observation.health), (100, 100));
}

#[tokio::test]
async fn spectator_pump_cancellation_removes_spectator() {
    let svc = service(Mode::Training);
    let stream = svc
        .create_spectator(&mock(), SpectatorRequest { spectator_id: "s1".into() })
        .await
        .unwrap();
    svc.subscribe_spectator_to_region(
        &mock(),
        SubscriptionRequest {
            spectator_id: "s1".into(),
            region: Region::new(0, 0),
        },
    )
    .await
    .unwrap();

    let (mut sink, mut delivered) = mpsc::channel::<SpectateEvent>(16);
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let pump = tokio::spawn(async move {
        stream
            .pump(&mut sink, async {
                let _ = cancel_rx.await;
            })
            .await
    });

    svc.create_entity(&mock(), food_at(2, 2)).await.unwrap();
    let event = tokio::time::timeout(Duration::from_secs(1), delivered.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.as_cell_update().unwrap().position, Position::new(2, 2));

    cancel_tx.send(()).unwrap();
    assert_eq!(pump.await.unwrap(), StreamEnd::Cancelled);
    assert!(!svc.simulation().lock().await.stadium().contains("s1"));

    let err = svc
        .subscribe_spectator_to_region(
            &mock(),
            SubscriptionRequest {
                spectator_id: "s1".into(),
                region: Region::new(0, 0),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NotFound);
}

#[tokio::test]
async fn model_pump_ends_when_sink_fails() {
    let svc = service(Mode::Training);
    let stream = svc
        .connect_remote_model(&mock(), ConnectRemoteModelRequest { model_name: Some("forager".into()) })
        .await
        .unwrap();
    svc.create_entity(&mock(), agent_at(0, 0)).await.unwrap();

    let (mut sink, delivered) = mpsc::channel::<Observation>(1);
    drop(delivered);
    svc.step_world(&mock()).await.unwrap();

    let end = stream.pump(&mut sink, std::future::pending()).await;
    assert_eq!(end, StreamEnd::SinkFailed);
    assert!(
        !svc.simulation()
            .lock()
            .await
            .models()
            .is_registered(MOCK_USER_ID, "forager")
    );
}

#[tokio::test]
async fn dropped_streams_release_their_sessions() {
    let svc = service(Mode::Training);
    let spectator = svc
        .create_spectator(&mock(), SpectatorRequest { spectator_id: "brief".into() })
        .await
        .unwrap();
    let model = svc
        .connect_remote_model(&mock(), ConnectRemoteModelRequest { model_name: Some("forager".into()) })
        .await
        .unwrap();
    drop(spectator);
    drop(model);

    let released = async {
        loop {
            {
                let sim = svc.simulation().lock().await;
                if !sim.stadium().contains("brief") && !sim.models().is_registered(MOCK_USER_ID, "forager") {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(1), released).await.unwrap();

    let again = svc
        .connect_remote_model(&mock(), ConnectRemoteModelRequest { model_name: Some("forager".into()) })
        .await;
    assert!(again.is_ok());
}
