//! Seller profile (organization and sub-accounts)

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Profile fields required before confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    BankAccount,
    BankName,
    AccountHolder,
    RepresentativeName,
    RepresentativePhone,
    ManagerName,
    ManagerPhone,
    DepositorName,
    SubAccountBankAccount,
    SubAccountBankName,
    SubAccountAccountHolder,
    SubAccountRepresentativeName,
}

impl ProfileField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::BankAccount => "정산 계좌번호",
            Self::BankName => "은행명",
            Self::AccountHolder => "예금주",
            Self::RepresentativeName => "대표자명",
            Self::RepresentativePhone => "대표자 연락처",
            Self::ManagerName => "담당자명",
            Self::ManagerPhone => "담당자 연락처",
            Self::DepositorName => "입금자명",
            Self::SubAccountBankAccount => "서브계정 정산 계좌번호",
            Self::SubAccountBankName => "서브계정 은행명",
            Self::SubAccountAccountHolder => "서브계정 예금주",
            Self::SubAccountRepresentativeName => "서브계정 대표자명",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub business_name: String,
    pub tier_code: Option<String>,
    pub bank_account: Option<String>,
    pub bank_name: Option<String>,
    pub account_holder: Option<String>,
    pub representative_name: Option<String>,
    pub representative_phone: Option<String>,
    pub manager_name: Option<String>,
    pub manager_phone: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAccount {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub business_name: String,
    pub seller_code: Option<String>,
    pub is_main: bool,
    pub bank_account: Option<String>,
    pub bank_name: Option<String>,
    pub account_holder: Option<String>,
    pub representative_name: Option<String>,
}

fn blank(v: &Option<String>) -> bool { v.as_deref().map(str::trim).unwrap_or("").is_empty() }

/// Lists every profile field missing for a confirmation by `sub_account`
/// (a non-main sub-account) or by the main account when `None`.
pub fn missing_profile_fields(
    org: &Organization,
    sub_account: Option<&SubAccount>,
    depositor_name: Option<&str>,
) -> Vec<ProfileField> {
    let mut missing = Vec::new();
    let mut need = |field: ProfileField, value: &Option<String>| if blank(value) { missing.push(field) };

    need(ProfileField::BankAccount, &org.bank_account);
    need(ProfileField::BankName, &org.bank_name);
    need(ProfileField::AccountHolder, &org.account_holder);
    need(ProfileField::RepresentativeName, &org.representative_name);
    need(ProfileField::RepresentativePhone, &org.representative_phone);

    match sub_account.filter(|s| !s.is_main) {
        Some(sub) => {
            need(ProfileField::SubAccountBankAccount, &sub.bank_account);
            need(ProfileField::SubAccountBankName, &sub.bank_name);
            need(ProfileField::SubAccountAccountHolder, &sub.account_holder);
            need(ProfileField::SubAccountRepresentativeName, &sub.representative_name);
        }
        None => {
            need(ProfileField::ManagerName, &org.manager_name);
            need(ProfileField::ManagerPhone, &org.manager_phone);
            need(ProfileField::DepositorName, &depositor_name.map(str::to_string));
        }
    }
    missing
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn complete_org(id: Uuid) -> Organization {
        Organization {
            id, business_name: "달래마켓".into(), tier_code: Some("gold".into()),
            bank_account: Some("123-456".into()), bank_name: Some("국민은행".into()), account_holder: Some("홍길동".into()),
            representative_name: Some("홍길동".into()), representative_phone: Some("010-1234-5678".into()),
            manager_name: Some("김담당".into()), manager_phone: Some("010-9999-8888".into()),
        }
    }

    #[test]
    fn test_main_account_needs_manager_and_depositor() {
        let mut org = complete_org(Uuid::new_v4());
        org.manager_phone = Some("  ".into());
        let missing = missing_profile_fields(&org, None, None);
        assert_eq!(missing, vec![ProfileField::ManagerPhone, ProfileField::DepositorName]);
        assert!(missing_profile_fields(&complete_org(org.id), None, Some("홍길동")).is_empty());
    }

    #[test]
    fn test_sub_account_needs_its_own_bank_fields() {
        let org = complete_org(Uuid::new_v4());
        let sub = SubAccount { id: Uuid::new_v4(), organization_id: org.id, bank_name: Some("신한".into()), ..SubAccount::default() };
        let missing = missing_profile_fields(&org, Some(&sub), None);
        assert_eq!(missing, vec![
            ProfileField::SubAccountBankAccount,
            ProfileField::SubAccountAccountHolder,
            ProfileField::SubAccountRepresentativeName,
        ]);
    }
}
