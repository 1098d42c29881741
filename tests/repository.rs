//! Repository integration tests over the in-memory event store.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use edgestore::entity::{
    DeleteEntity, Entity, EntityCommand, InsertEntity, UpdateEntity,
};
use edgestore::eventstore::{Aggregate, MemoryStore, Repository};
use edgestore::model::{Command, CommandModel, Data, Event, EventModel, Id};
use edgestore::{Error, Kind};

fn insert(id: &str, tenant: &str, otype: &str, data: Data) -> EntityCommand {
    EntityCommand::Insert(InsertEntity {
        model: CommandModel::new(id, tenant),
        data,
        otype: otype.to_string(),
    })
}

fn update(id: &str, tenant: &str, data: Data) -> EntityCommand {
    EntityCommand::Update(UpdateEntity {
        model: CommandModel::new(id, tenant),
        data,
    })
}

fn delete(id: &str, tenant: &str) -> EntityCommand {
    EntityCommand::Delete(DeleteEntity {
        model: CommandModel::new(id, tenant),
    })
}

fn named_data(name: &str) -> Data {
    let mut data = Data::new();
    data.insert("n".into(), serde_json::json!(name));
    data
}

#[tokio::test]
async fn apply_assigns_strictly_increasing_versions_from_one() {
    let store = Arc::new(MemoryStore::new());
    let repo: Repository<Entity> = Repository::new(store.clone(), Vec::new());

    assert_eq!(repo.apply(&insert("u1", "t1", "user", named_data("A"))).await.unwrap(), 1);
    assert_eq!(repo.apply(&update("u1", "t1", named_data("B"))).await.unwrap(), 2);
    assert_eq!(repo.apply(&delete("u1", "t1")).await.unwrap(), 3);

    use edgestore::eventstore::Store as _;
    let history = store
        .load(&Id::from("u1"), &Id::from("t1"), 0, 0)
        .await
        .unwrap();
    let versions: Vec<i32> = history.iter().map(|r| r.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
}

#[tokio::test]
async fn load_replays_to_the_same_state_apply_produced() {
    let store = Arc::new(MemoryStore::new());
    let repo: Repository<Entity> = Repository::new(store.clone(), Vec::new());

    repo.apply(&insert("u1", "t1", "user", named_data("A"))).await.unwrap();
    repo.apply(&update("u1", "t1", named_data("B"))).await.unwrap();

    let id = Id::from("u1");
    let tenant = Id::from("t1");
    let loaded = repo.load(&id, &tenant).await.unwrap();

    // rebuild once more through a second repository over the same store
    let other: Repository<Entity> = Repository::new(store, Vec::new());
    let replayed = other.load(&id, &tenant).await.unwrap();

    assert_eq!(loaded, replayed);
    assert_eq!(replayed.version, 2);
    assert_eq!(replayed.data["n"], "B");
    assert_eq!(replayed.otype, "user");
}

#[tokio::test]
async fn load_at_version_stops_replay_early() {
    let store = Arc::new(MemoryStore::new());
    let repo: Repository<Entity> = Repository::new(store, Vec::new());

    repo.apply(&insert("u1", "t1", "user", named_data("A"))).await.unwrap();
    repo.apply(&update("u1", "t1", named_data("B"))).await.unwrap();

    let past = repo
        .load_at_version(&Id::from("u1"), &Id::from("t1"), 1)
        .await
        .unwrap();
    assert_eq!(past.version, 1);
    assert_eq!(past.data["n"], "A");
}

#[tokio::test]
async fn load_at_time_stops_before_later_events() {
    let store = Arc::new(MemoryStore::new());
    let repo: Repository<Entity> = Repository::new(store, Vec::new());

    repo.apply(&insert("u1", "t1", "user", named_data("A"))).await.unwrap();
    let id = Id::from("u1");
    let tenant = Id::from("t1");
    let after_insert = repo.load(&id, &tenant).await.unwrap().updated_at.unwrap();

    repo.apply(&update("u1", "t1", named_data("B"))).await.unwrap();

    let past = repo.load_at_time(&id, &tenant, after_insert).await.unwrap();
    assert_eq!(past.version, 1);
    assert_eq!(past.data["n"], "A");

    let present = repo.load_at_time(&id, &tenant, Utc::now()).await.unwrap();
    assert_eq!(present.version, 2);
}

#[tokio::test]
async fn load_of_an_absent_aggregate_is_not_found() {
    let store = Arc::new(MemoryStore::new());
    let repo: Repository<Entity> = Repository::new(store, Vec::new());

    let err = repo
        .load(&Id::from("nobody"), &Id::from("t1"))
        .await
        .unwrap_err();
    assert!(Error::is(Kind::NotFound, &err));
}

#[tokio::test]
async fn tenants_never_observe_each_others_events() {
    let store = Arc::new(MemoryStore::new());
    let repo: Repository<Entity> = Repository::new(store, Vec::new());

    repo.apply(&insert("u1", "t1", "user", named_data("A"))).await.unwrap();
    repo.apply(&insert("u1", "t2", "robot", named_data("Z"))).await.unwrap();
    repo.apply(&update("u1", "t1", named_data("B"))).await.unwrap();

    let id = Id::from("u1");
    let a = repo.load(&id, &Id::from("t1")).await.unwrap();
    let b = repo.load(&id, &Id::from("t2")).await.unwrap();

    assert_eq!(a.version, 2);
    assert_eq!(a.otype, "user");
    assert_eq!(b.version, 1);
    assert_eq!(b.otype, "robot");
    assert_eq!(b.data["n"], "Z");
}

#[tokio::test]
async fn apply_rejects_commands_without_id_or_tenant() {
    let store = Arc::new(MemoryStore::new());
    let repo: Repository<Entity> = Repository::new(store, Vec::new());

    let err = repo
        .apply(&insert("", "t1", "user", Data::new()))
        .await
        .unwrap_err();
    assert!(Error::is(Kind::Invalid, &err));

    let err = repo
        .apply(&insert("u1", "", "user", Data::new()))
        .await
        .unwrap_err();
    assert!(Error::is(Kind::Invalid, &err));
}

#[tokio::test]
async fn observers_see_events_in_order_once_each() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&seen);
    let second = Arc::clone(&seen);
    let observers: Vec<edgestore::eventstore::Observer<_>> = vec![
        Box::new(move |event: &edgestore::entity::EntityEvent| {
            first
                .lock()
                .unwrap()
                .push(format!("first:v{}", event.event_version()));
        }),
        Box::new(move |event: &edgestore::entity::EntityEvent| {
            second
                .lock()
                .unwrap()
                .push(format!("second:v{}", event.event_version()));
        }),
    ];

    let store = Arc::new(MemoryStore::new());
    let repo: Repository<Entity> = Repository::new(store, observers);

    repo.apply(&insert("u1", "t1", "user", Data::new())).await.unwrap();
    repo.apply(&update("u1", "t1", named_data("B"))).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec!["first:v1", "second:v1", "first:v2", "second:v2"]);
}

// ============================================================================
// Nop commands, via an aggregate whose commands may emit nothing
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Gate {
    id: Id,
    tenant_id: Id,
    open: bool,
    version: i32,
}

#[derive(Debug, Clone)]
struct OpenGate {
    model: CommandModel,
}

impl Command for OpenGate {
    fn command_id(&self) -> &Id {
        &self.model.id
    }

    fn command_tenant_id(&self) -> &Id {
        &self.model.tenant_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
enum GateEvent {
    GateOpened(GateOpened),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct GateOpened {
    #[serde(flatten)]
    model: EventModel,
}

impl Event for GateEvent {
    fn event_id(&self) -> &Id {
        match self {
            GateEvent::GateOpened(e) => &e.model.id,
        }
    }

    fn event_tenant_id(&self) -> &Id {
        match self {
            GateEvent::GateOpened(e) => &e.model.tenant_id,
        }
    }

    fn event_version(&self) -> i32 {
        match self {
            GateEvent::GateOpened(e) => e.model.version,
        }
    }

    fn event_at(&self) -> Option<chrono::DateTime<Utc>> {
        match self {
            GateEvent::GateOpened(e) => e.model.at,
        }
    }
}

impl Aggregate for Gate {
    type Command = OpenGate;
    type Event = GateEvent;

    fn apply(&self, command: &OpenGate) -> edgestore::Result<Vec<GateEvent>> {
        // opening an open gate is a nop
        if self.open {
            return Ok(Vec::new());
        }

        Ok(vec![GateEvent::GateOpened(GateOpened {
            model: EventModel {
                id: command.model.id.clone(),
                tenant_id: command.model.tenant_id.clone(),
                version: self.version + 1,
                at: Some(Utc::now()),
            },
        })])
    }

    fn on(&mut self, event: &GateEvent) -> edgestore::Result<()> {
        self.open = true;
        self.id = event.event_id().clone();
        self.tenant_id = event.event_tenant_id().clone();
        self.version = event.event_version();
        Ok(())
    }
}

#[tokio::test]
async fn nop_command_returns_the_pre_existing_version() {
    let store = Arc::new(MemoryStore::new());
    let repo: Repository<Gate> = Repository::new(store, Vec::new());

    let open = OpenGate {
        model: CommandModel::new("g1", "t1"),
    };

    assert_eq!(repo.apply(&open).await.unwrap(), 1);
    // the second open emits no events and the version stays put
    assert_eq!(repo.apply(&open).await.unwrap(), 1);

    let gate = repo.load(&Id::from("g1"), &Id::from("t1")).await.unwrap();
    assert_eq!(gate.version, 1);
    assert!(gate.open);
}

#[tokio::test]
async fn nop_command_on_an_absent_aggregate_returns_version_zero() {
    // a Gate that is already open in its default state never emits
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct SilentGate(Gate);

    impl Aggregate for SilentGate {
        type Command = OpenGate;
        type Event = GateEvent;

        fn apply(&self, _command: &OpenGate) -> edgestore::Result<Vec<GateEvent>> {
            Ok(Vec::new())
        }

        fn on(&mut self, event: &GateEvent) -> edgestore::Result<()> {
            self.0.on(event)
        }
    }

    let store = Arc::new(MemoryStore::new());
    let repo: Repository<SilentGate> = Repository::new(store, Vec::new());

    let version = repo
        .apply(&OpenGate {
            model: CommandModel::new("g1", "t1"),
        })
        .await
        .unwrap();
    assert_eq!(version, 0);
}
