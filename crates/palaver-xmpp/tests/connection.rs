// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;
use std::time::Duration;

use std::sync::Arc;

use anyhow::Result;
use jid::{BareJid, Jid};
use minidom::Element;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

use palaver_xmpp::client::Event as ClientEvent;
use palaver_xmpp::handler::{HandlerScope, Matcher};
use palaver_xmpp::stanza::{DefinedCondition, StanzaError};
use palaver_xmpp::test::{
    init_tracing, BareJidTestAdditions, ClientTestAdditions, ConnectedClient, MockServer,
    BOUND_JID,
};
use palaver_xmpp::{
    full, jid, mods, Client, ConnectionConfig, ConnectionError, ConnectionStatus, Event,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_reports_status_sequence_when_connecting() -> Result<()> {
    init_tracing();

    let server = MockServer::default();
    let client = Client::builder()
        .set_transport_provider(server.provider())
        .add_mod(mods::Roster::default())
        .build();

    let mut statuses = client.status_stream();
    client.connect(&Jid::from(full!(BOUND_JID)), "secret").await?;

    assert_eq!(
        statuses.drain(),
        vec![
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Authenticating,
            ConnectionStatus::Connected,
        ]
    );
    assert_eq!(client.connected_jid(), Some(full!(BOUND_JID)));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_loads_roster_and_sends_presence_after_connecting() -> Result<()> {
    let server = MockServer::default();
    let client = Client::builder()
        .set_transport_provider(server.provider())
        .add_mod(mods::Roster::default())
        .build();

    client.connect(&Jid::from(full!(BOUND_JID)), "secret").await?;
    server.flush().await;

    let sent = server.sent_stanzas();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].name(), "iq");
    assert!(sent[0].has_child("query", "jabber:iq:roster"));
    assert_eq!(sent[1].name(), "presence");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_answers_unhandled_iq_with_service_unavailable() -> Result<()> {
    let ConnectedClient { server, .. } = Client::connected_client().await?;

    server
        .receive_stanza(Element::from_str(
            r#"<iq xmlns="jabber:client" type="get" id="q1" from="friend@prose.org/phone" to="test@prose.org/test">
                <query xmlns="urn:example:unknown"/>
            </iq>"#,
        )?)
        .await;

    let sent = server.sent_stanzas();
    assert_eq!(sent.len(), 1);

    let reply = &sent[0];
    assert_eq!(reply.attr("type"), Some("error"));
    assert_eq!(reply.attr("id"), Some("q1"));
    assert_eq!(reply.attr("to"), Some("friend@prose.org/phone"));
    assert_eq!(
        StanzaError::from_stanza(reply).map(|err| err.condition),
        Some(DefinedCondition::ServiceUnavailable)
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_ignores_unhandled_iq_results() -> Result<()> {
    let ConnectedClient { server, .. } = Client::connected_client().await?;

    server
        .receive_stanza(Element::from_str(
            r#"<iq xmlns="jabber:client" type="result" id="unknown"/>"#,
        )?)
        .await;

    assert!(server.sent_stanzas().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_clears_session_state_when_disconnected() -> Result<()> {
    let ConnectedClient {
        client,
        server,
        sent_events,
        ..
    } = Client::connected_client().await?;

    server
        .receive_stanza(Element::from_str(
            r#"<message xmlns="jabber:client" type="chat" id="m1" from="friend@prose.org/phone">
                <body>Hello</body>
            </message>"#,
        )?)
        .await;
    assert!(client.messages_with(&BareJid::theirs()).is_some());

    // Listeners run in the order they were added, i.e. after the client's own one.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.connection().add_status_listener(move |status| {
        if status == ConnectionStatus::Disconnected {
            _ = tx.send(());
        }
    });

    client.disconnect();
    rx.recv().await;

    assert!(client.contacts().is_empty());
    assert!(client.conversations().is_empty());
    assert!(client.rooms().is_empty());
    assert!(sent_events
        .read()
        .contains(&Event::Client(ClientEvent::Disconnected { condition: None })));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_fails_without_usable_auth_mechanism() -> Result<()> {
    let server = MockServer::default();
    let client = Client::builder()
        .set_config(ConnectionConfig {
            allow_legacy_auth: false,
            ..Default::default()
        })
        .set_transport_provider(server.provider())
        .build();

    // Without a local part the client logs in anonymously, which the mock doesn't offer.
    let result = client
        .connect(&Jid::from_str("prose.org")?, "")
        .await;

    assert!(result.is_err());
    assert_eq!(client.status(), ConnectionStatus::Disconnected);
    assert_eq!(
        client.connection().last_condition(),
        Some("no-auth-mech".to_string())
    );

    Ok(())
}

/// Fires once the connection reports `Disconnected`, after the client's own listener ran.
fn disconnected(client: &Client) -> tokio::sync::mpsc::UnboundedReceiver<()> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    client.connection().add_status_listener(move |status| {
        if status == ConnectionStatus::Disconnected {
            _ = tx.send(());
        }
    });
    rx
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_rejected_credentials_fail_authentication() -> Result<()> {
    let server = MockServer::default();
    server.reject_auth("not-authorized");

    let client = Client::builder()
        .set_transport_provider(server.provider())
        .build();
    let mut statuses = client.status_stream();

    let result = client.connect(&Jid::from(full!(BOUND_JID)), "wrong").await;

    assert_eq!(
        result,
        Err(ConnectionError::Auth {
            condition: "not-authorized".to_string()
        })
    );
    // `connect` resolves with the failure status, the final `Disconnected` may still be pending.
    let statuses = statuses.drain();
    assert_eq!(
        statuses[..4],
        [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Authenticating,
            ConnectionStatus::Authfail,
        ]
    );
    assert_eq!(client.connected_jid(), None);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_resource_conflict_fails_authentication() -> Result<()> {
    let server = MockServer::default();
    server.reject_bind("conflict");

    let client = Client::builder()
        .set_transport_provider(server.provider())
        .build();
    let mut statuses = client.status_stream();

    let result = client.connect(&Jid::from(full!(BOUND_JID)), "secret").await;

    assert_eq!(
        result,
        Err(ConnectionError::Auth {
            condition: "conflict".to_string()
        })
    );
    assert_eq!(
        client.connection().last_condition(),
        Some("conflict".to_string())
    );
    let statuses = statuses.drain();
    assert!(statuses.contains(&ConnectionStatus::Authfail));
    assert!(!statuses.contains(&ConnectionStatus::Connected));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_unanswered_disconnect_times_out() -> Result<()> {
    let server = MockServer::default();
    server.ignore_disconnect();

    let client = Client::builder()
        .set_config(ConnectionConfig {
            disconnect_timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .set_transport_provider(server.provider())
        .build();
    client.connect(&Jid::from(full!(BOUND_JID)), "secret").await?;

    let mut statuses = client.status_stream();
    let mut disconnected = disconnected(&client);

    client.disconnect();
    tokio::time::timeout(Duration::from_secs(2), disconnected.recv()).await?;

    assert_eq!(
        statuses.drain(),
        vec![
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnecting,
            ConnectionStatus::ConnTimeout,
            ConnectionStatus::Disconnected,
        ]
    );

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_disconnect_without_session_skips_disconnecting() -> Result<()> {
    let server = MockServer::default();
    server.withhold_auth_response();

    let client = Client::builder()
        .set_transport_provider(server.provider())
        .build();
    let mut statuses = client.status_stream();
    let mut progress = client.status_stream();

    let jid = Jid::from(full!(BOUND_JID));
    let (result, _) = tokio::join!(client.connect(&jid, "secret"), async {
        while let Some(status) = progress.recv().await {
            if status == ConnectionStatus::Authenticating {
                client.disconnect();
                break;
            }
        }
    });

    assert!(result.is_err());
    assert_eq!(
        statuses.drain(),
        vec![
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Authenticating,
            ConnectionStatus::Disconnected,
        ]
    );
    assert!(!server
        .sent_stanzas()
        .iter()
        .any(|stanza| stanza.name() == "presence"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_disconnect_when_never_connected_is_a_no_op() -> Result<()> {
    let server = MockServer::default();
    let client = Client::builder()
        .set_transport_provider(server.provider())
        .build();
    let mut statuses = client.status_stream();

    client.disconnect();

    assert_eq!(statuses.drain(), vec![ConnectionStatus::Disconnected]);
    assert!(server.sent_stanzas().is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_logout_empties_block_list() -> Result<()> {
    let ConnectedClient { client, .. } = Client::connected_client().await?;
    let block_list = client.get_mod::<mods::BlockList>();

    block_list.block_jid(&jid!("spam@prose.org")).await?;
    assert!(block_list.is_blocked(&jid!("spam@prose.org")));

    let mut disconnected = disconnected(&client);
    client.disconnect();
    disconnected.recv().await;

    assert!(block_list.blocked_jids().is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_async_handlers_finish_before_next_stanza() -> Result<()> {
    let ConnectedClient { client, server, .. } = Client::connected_client().await?;
    let calls = Arc::new(Mutex::new(Vec::<String>::new()));
    let handlers = client.connection().handlers();

    let log = calls.clone();
    handlers.add_async_handler(Matcher::new().name("message"), HandlerScope::User, move |elem| {
        let log = log.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            log.lock()
                .push(format!("async {}", elem.attr("id").unwrap_or_default()));
            Ok(true)
        }
    });

    let log = calls.clone();
    handlers.add_handler(Matcher::new().name("message"), HandlerScope::User, move |elem| {
        log.lock()
            .push(format!("sync {}", elem.attr("id").unwrap_or_default()));
        Ok(true)
    });

    for id in ["m1", "m2"] {
        server
            .receive_stanza(Element::from_str(&format!(
                r#"<message xmlns="jabber:client" type="headline" id="{id}" from="prose.org"/>"#
            ))?)
            .await;
    }

    assert_eq!(
        *calls.lock(),
        vec!["sync m1", "async m1", "sync m2", "async m2"]
    );

    Ok(())
}
