// palaver/palaver-xmpp
//
// Copyright: 2024, Marc Bauer <mb@nesium.com>
// License: Mozilla Public License v2.0 (MPL v2.0)

use std::str::FromStr;

use anyhow::Result;
use minidom::Element;
use pretty_assertions::assert_eq;

use palaver_xmpp::mods::muc::{Event as MucEvent, ExitReason, RoomConfig};
use palaver_xmpp::stanza::DataForm;
use palaver_xmpp::test::{ClientTestAdditions, ConnectedClient};
use palaver_xmpp::{bare, mods, ns, Client, Event};

const ROOM: &str = "room@conference.prose.org";

/// Answers join presences with our own occupant presence carrying `affiliation`.
fn muc_server(affiliation: &'static str) -> impl FnMut(&Element) -> Vec<Element> + Send {
    move |stanza: &Element| {
        if stanza.name() == "presence" && stanza.attr("type").is_none() {
            let Some(to) = stanza.attr("to") else {
                return vec![];
            };
            let presence = format!(
                r#"<presence xmlns="jabber:client" from="{to}" to="test@prose.org/test">
                    <x xmlns="http://jabber.org/protocol/muc#user">
                        <item affiliation="{affiliation}" role="moderator"/>
                        <status code="110"/>
                        <status code="201"/>
                    </x>
                </presence>"#
            );
            return Element::from_str(&presence).into_iter().collect();
        }

        if stanza.name() != "iq" {
            return vec![];
        }

        let mut response = Element::builder("iq", ns::JABBER_CLIENT)
            .attr("type", "result")
            .attr("id", stanza.attr("id").unwrap_or_default())
            .attr("from", stanza.attr("to").unwrap_or_default());

        let is_config_request = stanza.attr("type") == Some("get")
            && stanza.get_child("query", ns::MUC_OWNER).is_some();
        if is_config_request {
            let form = Element::from_str(
                r#"<x xmlns="jabber:x:data" type="form">
                    <field var="FORM_TYPE" type="hidden">
                        <value>http://jabber.org/protocol/muc#roomconfig</value>
                    </field>
                    <field var="muc#roomconfig_roomname" type="text-single"/>
                    <field var="muc#roomconfig_persistentroom" type="boolean"><value>0</value></field>
                </x>"#,
            );
            if let Ok(form) = form {
                response = response.append(
                    Element::builder("query", ns::MUC_OWNER)
                        .append(form)
                        .build(),
                );
            }
        }

        vec![response.build()]
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_joins_room() -> Result<()> {
    let ConnectedClient { client, server, .. } = Client::connected_client().await?;
    server.set_stanza_handler(muc_server("member"));

    let room = client
        .get_mod::<mods::MUC>()
        .join_room(&bare!(ROOM), "me", None)
        .await?;

    assert_eq!(room.nick, "me");
    assert!(client.rooms().contains_key(&bare!(ROOM)));

    let join = &server.sent_stanzas()[0];
    assert_eq!(join.attr("to"), Some("room@conference.prose.org/me"));
    assert!(join.has_child("x", ns::MUC));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_cannot_join_room_twice() -> Result<()> {
    let ConnectedClient { client, server, .. } = Client::connected_client().await?;
    server.set_stanza_handler(muc_server("member"));

    let muc = client.get_mod::<mods::MUC>();
    muc.join_room(&bare!(ROOM), "me", None).await?;

    let err = muc
        .join_room(&bare!(ROOM), "me", None)
        .await
        .err()
        .map(|err| err.to_string());
    assert_eq!(err, Some("can not join room more than once".to_string()));
    assert_eq!(server.sent_stanzas().len(), 1);

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_create_room_fails_if_not_owner() -> Result<()> {
    let ConnectedClient { client, server, .. } = Client::connected_client().await?;
    server.set_stanza_handler(muc_server("member"));

    let err = client
        .get_mod::<mods::MUC>()
        .create_room(&bare!(ROOM), "me", RoomConfig::group("Room"))
        .await
        .err()
        .map(|err| err.to_string());

    assert_eq!(err, Some("user is not owner".to_string()));
    assert!(client.rooms().is_empty());

    server.flush().await;
    let sent = server.sent_stanzas();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].name(), "presence");
    assert_eq!(sent[1].attr("type"), Some("unavailable"));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_creates_and_configures_room() -> Result<()> {
    let ConnectedClient {
        client,
        server,
        sent_events,
        ..
    } = Client::connected_client().await?;
    server.set_stanza_handler(muc_server("owner"));

    let room = client
        .get_mod::<mods::MUC>()
        .create_room(&bare!(ROOM), "me", RoomConfig::group("Our Room"))
        .await?;
    assert_eq!(room.jid, bare!(ROOM));

    let sent = server.sent_stanzas();
    assert_eq!(sent.len(), 3);

    let submitted = sent[2]
        .get_child("query", ns::MUC_OWNER)
        .and_then(|query| query.get_child("x", ns::DATA_FORMS))
        .map(DataForm::try_from)
        .transpose()?
        .ok_or_else(|| anyhow::anyhow!("missing submitted form"))?;
    assert_eq!(submitted.field_value("muc#roomconfig_roomname"), Some("Our Room"));
    assert_eq!(submitted.field_value("muc#roomconfig_persistentroom"), Some("true"));

    assert!(sent_events
        .read()
        .contains(&Event::MUC(MucEvent::RoomCreated { room: bare!(ROOM) })));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_kick_removes_occupant() -> Result<()> {
    let ConnectedClient { client, server, .. } = Client::connected_client().await?;
    server.set_stanza_handler(muc_server("owner"));

    let muc = client.get_mod::<mods::MUC>();
    muc.join_room(&bare!(ROOM), "me", None).await?;

    server
        .receive_stanza(Element::from_str(
            r#"<presence xmlns="jabber:client" from="room@conference.prose.org/juliet">
                <x xmlns="http://jabber.org/protocol/muc#user">
                    <item affiliation="none" role="participant"/>
                </x>
            </presence>"#,
        )?)
        .await;
    assert!(client
        .rooms()
        .get(&bare!(ROOM))
        .and_then(|room| room.occupant("juliet").cloned())
        .is_some());

    muc.kick_from_room(&bare!(ROOM), "juliet", Some("Be nice"))
        .await?;

    assert!(client
        .rooms()
        .get(&bare!(ROOM))
        .and_then(|room| room.occupant("juliet").cloned())
        .is_none());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_reports_being_banned() -> Result<()> {
    let ConnectedClient {
        client,
        server,
        sent_events,
        ..
    } = Client::connected_client().await?;
    server.set_stanza_handler(muc_server("member"));

    client
        .get_mod::<mods::MUC>()
        .join_room(&bare!(ROOM), "me", None)
        .await?;
    server.flush().await;
    sent_events.write().clear();

    server
        .receive_stanza(Element::from_str(
            r#"<presence xmlns="jabber:client" type="unavailable" from="room@conference.prose.org/me">
                <x xmlns="http://jabber.org/protocol/muc#user">
                    <item affiliation="outcast" role="none">
                        <actor nick="boss"/>
                        <reason>Spamming</reason>
                    </item>
                    <status code="110"/>
                    <status code="301"/>
                </x>
            </presence>"#,
        )?)
        .await;

    assert!(client.rooms().is_empty());
    assert_eq!(
        *sent_events.read(),
        vec![Event::MUC(MucEvent::RoomLeft {
            room: bare!(ROOM),
            reason: ExitReason::Banned {
                actor: "boss".to_string(),
                reason: "Spamming".to_string()
            }
        })]
    );

    Ok(())
}
