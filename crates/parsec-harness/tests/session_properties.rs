//! Property-based session tests
//!
//! Random interleavings of TSK loss (server side, local deletion, local
//! corruption), restarts and calls. Whatever happens to the TSK:
//! 1. Every call succeeds
//! 2. The session id never changes
//! 3. The SCK is registered exactly once

use parsec_core::{MemoryStorage, SessionStorage, Value, protocol::REGISTER_SCK, session::TSK_SLOT};
use parsec_harness::{SimEnv, SimService, connect, sim_service::ECHO};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Event {
    Call(u8),
    ServerDropsTsks,
    LocalTskDeleted,
    LocalTskCorrupted(u8),
    Restart,
}

fn event() -> impl Strategy<Value = Event> {
    prop_oneof![
        4 => any::<u8>().prop_map(Event::Call),
        1 => Just(Event::ServerDropsTsks),
        1 => Just(Event::LocalTskDeleted),
        1 => any::<u8>().prop_map(Event::LocalTskCorrupted),
        1 => Just(Event::Restart),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_tsk_loss_never_costs_the_session(
        seed in any::<u64>(),
        events in prop::collection::vec(event(), 1..24),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let service = SimService::new(SimEnv::with_seed(seed));
            let storage = MemoryStorage::new();
            let mut session = connect(&service, storage.clone(), SimEnv::with_seed(seed ^ 1));
            let session_id = session.id().await.unwrap();

            for event in events {
                match event {
                    Event::Call(byte) => {
                        let arg = Value::from(u64::from(byte));
                        prop_assert_eq!(session.call(ECHO, arg.clone()).await.unwrap(), arg);
                    },
                    Event::ServerDropsTsks => service.drop_session_keys(),
                    Event::LocalTskDeleted => storage.remove_item(TSK_SLOT).unwrap(),
                    Event::LocalTskCorrupted(byte) => {
                        storage.set_item(TSK_SLOT, &hex::encode([byte; 32])).unwrap();
                    },
                    Event::Restart => {
                        session = connect(&service, storage.clone(), SimEnv::with_seed(seed ^ 2));
                    },
                }
            }

            session.call(ECHO, Value::Null).await.unwrap();
            prop_assert_eq!(session.id().await.unwrap(), session_id);
            prop_assert_eq!(service.calls(REGISTER_SCK), 1);
            Ok(())
        })?;
    }
}
