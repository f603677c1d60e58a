// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use jid::BareJid;
use minidom::Element;
use pretty_assertions::assert_eq;

use palaver_xmpp::models::{ChatMessage, MessageKind};
use palaver_xmpp::test::{BareJidTestAdditions, ClientTestAdditions, ConnectedClient};
use palaver_xmpp::{jid, mods, ns, Client, Event};

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_stores_incoming_message_and_sends_event() -> Result<()> {
    let ConnectedClient {
        client,
        server,
        sent_events,
        ..
    } = Client::connected_client().await?;

    let stanza = Element::from_str(
        r#"<message xmlns="jabber:client" type="chat" id="m1" from="friend@prose.org/phone" to="test@prose.org/test">
            <body>Hello World</body>
        </message>"#,
    )?;
    server.receive_stanza(stanza.clone()).await;
    // Redelivery of the same message is ignored.
    server.receive_stanza(stanza).await;

    let expected = ChatMessage {
        id: "m1".to_string(),
        stanza_id: None,
        kind: MessageKind::Chat,
        from: jid!("friend@prose.org/phone"),
        to: Some(jid!("test@prose.org/test")),
        body: "Hello World".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        delayed: false,
        from_archive: false,
        outgoing: false,
    };

    assert_eq!(
        *sent_events.read(),
        vec![Event::Chat(mods::chat::Event::MessageReceived {
            with: BareJid::theirs(),
            message: expected.clone()
        })]
    );
    assert_eq!(
        client
            .messages_with(&BareJid::theirs())
            .map(|messages| messages.messages().to_vec()),
        Some(vec![expected])
    );
    // Strangers don't end up on the roster.
    assert!(client.contacts().is_empty());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_sends_message_with_origin_id() -> Result<()> {
    let ConnectedClient { client, server, .. } = Client::connected_client().await?;

    let id = client
        .get_mod::<mods::Chat>()
        .send_message(&BareJid::theirs(), "Hi there")?;
    server.flush().await;

    let sent = server.sent_stanzas();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].attr("type"), Some("chat"));
    assert_eq!(sent[0].attr("to"), Some("friend@prose.org"));
    assert_eq!(
        sent[0]
            .get_child("origin-id", ns::SID)
            .and_then(|origin_id| origin_id.attr("id")),
        Some(id.as_str())
    );

    let stored = client
        .messages_with(&BareJid::theirs())
        .and_then(|messages| messages.messages().first().cloned())
        .ok_or_else(|| anyhow::anyhow!("message was not stored"))?;
    assert!(stored.outgoing);
    assert_eq!(stored.body, "Hi there");

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_handles_sent_carbon() -> Result<()> {
    let ConnectedClient {
        client,
        server,
        sent_events,
        ..
    } = Client::connected_client().await?;

    server
        .receive_stanza(Element::from_str(
            r#"<message xmlns="jabber:client" from="test@prose.org" to="test@prose.org/test">
                <sent xmlns="urn:xmpp:carbons:2">
                    <forwarded xmlns="urn:xmpp:forward:0">
                        <message xmlns="jabber:client" type="chat" id="c1" from="test@prose.org/laptop" to="friend@prose.org">
                            <body>From my laptop</body>
                        </message>
                    </forwarded>
                </sent>
            </message>"#,
        )?)
        .await;

    let stored = client
        .messages_with(&BareJid::theirs())
        .and_then(|messages| messages.messages().first().cloned())
        .ok_or_else(|| anyhow::anyhow!("carbon was not stored"))?;
    assert!(stored.outgoing);
    assert_eq!(stored.id, "c1");

    assert_eq!(sent_events.read().len(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_ignores_forged_carbon() -> Result<()> {
    let ConnectedClient {
        client,
        server,
        sent_events,
        ..
    } = Client::connected_client().await?;

    server
        .receive_stanza(Element::from_str(
            r#"<message xmlns="jabber:client" from="mallory@evil.org/x" to="test@prose.org/test">
                <received xmlns="urn:xmpp:carbons:2">
                    <forwarded xmlns="urn:xmpp:forward:0">
                        <message xmlns="jabber:client" type="chat" id="c2" from="friend@prose.org/phone" to="test@prose.org/test">
                            <body>Forged</body>
                        </message>
                    </forwarded>
                </received>
            </message>"#,
        )?)
        .await;

    assert!(client.contacts().is_empty());
    assert!(client.conversations().is_empty());
    assert!(sent_events.read().is_empty());
    Ok(())
}
