// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;

use anyhow::Result;
use minidom::Element;
use pretty_assertions::assert_eq;

use palaver_xmpp::test::{ClientTestAdditions, ConnectedClient};
use palaver_xmpp::{jid, mods, Client, Event};

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_blocks_and_unblocks_user() -> Result<()> {
    let ConnectedClient { client, server, .. } = Client::connected_client().await?;
    let block_list = client.get_mod::<mods::BlockList>();

    block_list.block_jid(&jid!("spam@prose.org")).await?;
    assert!(block_list.is_blocked(&jid!("spam@prose.org")));

    block_list.unblock_jid(&jid!("spam@prose.org")).await?;
    assert!(!block_list.is_blocked(&jid!("spam@prose.org")));

    let sent = server.sent_stanzas();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].has_child("block", "urn:xmpp:blocking"));
    assert!(sent[1].has_child("unblock", "urn:xmpp:blocking"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_applies_block_push() -> Result<()> {
    let ConnectedClient {
        client,
        server,
        sent_events,
        ..
    } = Client::connected_client().await?;

    server
        .receive_stanza(Element::from_str(
            r#"<iq xmlns="jabber:client" type="set" id="push-1">
                <block xmlns="urn:xmpp:blocking"><item jid="spam@prose.org"/></block>
            </iq>"#,
        )?)
        .await;

    let block_list = client.get_mod::<mods::BlockList>();
    assert_eq!(block_list.blocked_jids(), vec![jid!("spam@prose.org")]);
    assert_eq!(
        *sent_events.read(),
        vec![Event::BlockList(mods::block_list::Event::UserBlocked {
            jid: jid!("spam@prose.org")
        })]
    );

    server
        .receive_stanza(Element::from_str(
            r#"<iq xmlns="jabber:client" type="set" id="push-2">
                <unblock xmlns="urn:xmpp:blocking"/>
            </iq>"#,
        )?)
        .await;
    assert!(block_list.blocked_jids().is_empty());

    Ok(())
}
