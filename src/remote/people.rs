//! Google People API client using reqwest.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::auth::Credential;
use crate::error::{Error, Result};
use crate::record::{ContactGroup, ContactRecord};
use crate::remote::{Page, Remote};

pub const DEFAULT_BASE_URL: &str = "https://people.googleapis.com/v1";

/// Person fields requested when listing connections
const PERSON_FIELDS: &str = "addresses,biographies,birthdays,calendarUrls,clientData,\
coverPhotos,emailAddresses,events,externalIds,genders,imClients,interests,locales,\
locations,memberships,metadata,miscKeywords,names,nicknames,occupations,organizations,\
phoneNumbers,photos,relations,sipAddresses,skills,urls,userDefined";

/// Fields echoed back by create calls
const CREATE_READ_MASK: &str = "names,emailAddresses,phoneNumbers,memberships,metadata";

/// People API client bound to one account's access token
pub struct PeopleClient {
    http: Client,
    base_url: String,
    credential: Credential,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionsResponse {
    #[serde(default)]
    connections: Vec<ContactRecord>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupsResponse {
    #[serde(default)]
    contact_groups: Vec<ContactGroup>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchCreateResponse {
    #[serde(default)]
    created_people: Vec<PersonResponse>,
}

#[derive(Deserialize)]
struct PersonResponse {
    person: Option<ContactRecord>,
}

impl PeopleClient {
    pub fn new(http: Client, base_url: impl Into<String>, credential: Credential) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
        }
    }

    pub fn account(&self) -> &str {
        &self.credential.account
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, endpoint: &str, request: RequestBuilder) -> Result<T> {
        debug!(account = %self.credential.account, endpoint, "sending request");

        let response = request
            .bearer_auth(&self.credential.access_token)
            .send()
            .await
            .map_err(|source| Error::Http {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message: api_error_message(status, &body),
            });
        }

        response.json::<T>().await.map_err(|source| Error::Http {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

impl PeopleClient {
    fn connections_request(&self, cursor: Option<String>, page_size: u32) -> RequestBuilder {
        let mut query = vec![
            ("pageSize", page_size.to_string()),
            ("personFields", PERSON_FIELDS.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("pageToken", cursor));
        }
        self.http.get(self.url("people/me/connections")).query(&query)
    }

    fn groups_request(&self, cursor: Option<String>, page_size: u32) -> RequestBuilder {
        let mut query = vec![("pageSize", page_size.to_string())];
        if let Some(cursor) = cursor {
            query.push(("pageToken", cursor));
        }
        self.http.get(self.url("contactGroups")).query(&query)
    }
}

impl Remote for PeopleClient {
    async fn list_connections(
        &self,
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<Page<ContactRecord>> {
        let request = self.connections_request(cursor, page_size);
        let response: ConnectionsResponse = self.send("people.connections.list", request).await?;
        Ok(Page::new(response.connections, response.next_page_token))
    }

    async fn list_groups(
        &self,
        cursor: Option<String>,
        page_size: u32,
    ) -> Result<Page<ContactGroup>> {
        let request = self.groups_request(cursor, page_size);
        let response: GroupsResponse = self.send("contactGroups.list", request).await?;
        Ok(Page::new(response.contact_groups, response.next_page_token))
    }

    async fn create_contact(&self, record: &ContactRecord) -> Result<ContactRecord> {
        let request = self
            .http
            .post(self.url("people:createContact"))
            .query(&[("personFields", CREATE_READ_MASK)])
            .json(record);
        self.send("people.createContact", request).await
    }

    async fn batch_create_contacts(&self, records: &[ContactRecord]) -> Result<Vec<ContactRecord>> {
        let request = self
            .http
            .post(self.url("people:batchCreateContacts"))
            .json(&batch_create_body(records));
        let response: BatchCreateResponse =
            self.send("people.batchCreateContacts", request).await?;

        created_people(response, records.len())
    }
}

fn batch_create_body(records: &[ContactRecord]) -> Value {
    let contacts: Vec<Value> = records
        .iter()
        .map(|record| json!({ "contactPerson": record }))
        .collect();
    json!({
        "contacts": contacts,
        "readMask": CREATE_READ_MASK,
    })
}

/// Every submitted contact must come back; otherwise the batch counts as failed
fn created_people(response: BatchCreateResponse, submitted: usize) -> Result<Vec<ContactRecord>> {
    let people: Vec<ContactRecord> = response
        .created_people
        .into_iter()
        .filter_map(|created| created.person)
        .collect();

    if people.len() != submitted {
        warn!(submitted, returned = people.len(), "batch response is missing contacts");
        return Err(Error::Api {
            endpoint: "people.batchCreateContacts".to_string(),
            status: StatusCode::OK.as_u16(),
            message: format!(
                "response held {} of {} submitted contact(s)",
                people.len(),
                submitted
            ),
        });
    }
    Ok(people)
}

/// Pull `error.message` out of a Google API error body, falling back to the raw text
fn api_error_message(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|value| value.pointer("/error/message"))
        .and_then(Value::as_str);

    match message {
        Some(message) => message.to_string(),
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string(),
        None => body.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message_from_google_body() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded for quota metric 'Critical write requests'", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            api_error_message(StatusCode::TOO_MANY_REQUESTS, body),
            "Quota exceeded for quota metric 'Critical write requests'"
        );
    }

    #[test]
    fn test_api_error_message_fallbacks() {
        assert_eq!(api_error_message(StatusCode::BAD_GATEWAY, ""), "Bad Gateway");
        assert_eq!(
            api_error_message(StatusCode::INTERNAL_SERVER_ERROR, "upstream broke\n"),
            "upstream broke"
        );
    }

    #[test]
    fn test_base_url_is_normalized() {
        let credential = Credential {
            account: "me@example.com".into(),
            access_token: "token".into(),
        };
        let client = PeopleClient::new(Client::new(), "https://example.test/v1/", credential);
        assert_eq!(client.url("contactGroups"), "https://example.test/v1/contactGroups");
        assert_eq!(client.account(), "me@example.com");
    }

    fn client() -> PeopleClient {
        let credential = Credential {
            account: "me@example.com".into(),
            access_token: "token".into(),
        };
        PeopleClient::new(Client::new(), "https://example.test/v1", credential)
    }

    fn query_pairs(request: RequestBuilder) -> Vec<(String, String)> {
        request
            .build()
            .unwrap()
            .url()
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect()
    }

    fn query_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn test_connections_request_carries_cursor() {
        let client = client();

        let first = query_pairs(client.connections_request(None, 1000));
        assert_eq!(query_value(&first, "pageSize"), Some("1000"));
        assert_eq!(query_value(&first, "personFields"), Some(PERSON_FIELDS));
        assert_eq!(query_value(&first, "pageToken"), None);

        let next = query_pairs(client.connections_request(Some("tok-2".into()), 1000));
        assert_eq!(query_value(&next, "pageToken"), Some("tok-2"));

        let url = client.connections_request(None, 10).build().unwrap().url().clone();
        assert_eq!(url.path(), "/v1/people/me/connections");
    }

    #[test]
    fn test_groups_request_carries_cursor() {
        let pairs = query_pairs(client().groups_request(Some("g-next".into()), 200));
        assert_eq!(query_value(&pairs, "pageSize"), Some("200"));
        assert_eq!(query_value(&pairs, "pageToken"), Some("g-next"));
    }

    #[test]
    fn test_connections_response_parsing() {
        let response: ConnectionsResponse = serde_json::from_value(json!({
            "connections": [
                {"resourceName": "people/c1", "etag": "e1", "names": [{"displayName": "Ada"}]},
                {"resourceName": "people/c2"}
            ],
            "nextPageToken": "abc",
            "totalPeople": 2
        }))
        .unwrap();
        assert_eq!(response.connections.len(), 2);
        assert_eq!(response.connections[0].resource_name(), Some("people/c1"));
        assert_eq!(response.next_page_token.as_deref(), Some("abc"));

        let last: ConnectionsResponse = serde_json::from_value(json!({"totalPeople": 0})).unwrap();
        assert!(last.connections.is_empty());
        assert!(last.next_page_token.is_none());
    }

    #[test]
    fn test_groups_response_parsing() {
        let response: GroupsResponse = serde_json::from_value(json!({
            "contactGroups": [
                {"resourceName": "contactGroups/myContacts", "name": "myContacts", "groupType": "SYSTEM_CONTACT_GROUP"},
                {"resourceName": "contactGroups/1a", "name": "Friends", "groupType": "USER_CONTACT_GROUP", "memberCount": 3}
            ],
            "nextPageToken": "",
            "totalItems": 2
        }))
        .unwrap();
        assert_eq!(response.contact_groups.len(), 2);
        assert_eq!(response.contact_groups[1].member_count, Some(3));

        let page = Page::new(response.contact_groups, response.next_page_token);
        assert!(page.next_cursor.is_none());

        let empty: GroupsResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.contact_groups.is_empty());
    }

    #[test]
    fn test_batch_create_body() {
        let record = ContactRecord::try_from(json!({"names": [{"givenName": "Ada"}]})).unwrap();
        assert_eq!(
            batch_create_body(&[record]),
            json!({
                "contacts": [{"contactPerson": {"names": [{"givenName": "Ada"}]}}],
                "readMask": CREATE_READ_MASK
            })
        );
    }

    #[test]
    fn test_batch_response_returns_every_person() {
        let response: BatchCreateResponse = serde_json::from_value(json!({
            "createdPeople": [
                {"httpStatusCode": 200, "person": {"resourceName": "people/c1"}},
                {"httpStatusCode": 200, "person": {"resourceName": "people/c2"}}
            ]
        }))
        .unwrap();
        let people = created_people(response, 2).unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[1].resource_name(), Some("people/c2"));
    }

    #[test]
    fn test_batch_response_missing_people_fails_batch() {
        let response: BatchCreateResponse = serde_json::from_value(json!({
            "createdPeople": [
                {"httpStatusCode": 200, "person": {"resourceName": "people/c1"}},
                {"httpStatusCode": 400, "status": {"message": "bad"}}
            ]
        }))
        .unwrap();
        let err = created_people(response, 2).unwrap_err();
        assert!(err.is_transport());
        assert!(err.to_string().contains("response held 1 of 2 submitted"));
    }
}
