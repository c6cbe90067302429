use famreg_core::{Member, MemberField, MemberId, Record, RecordField, RecordId};

pub fn rid(id: &str) -> RecordId {
    RecordId::new(id).expect("valid record id")
}

pub fn mid(id: &str) -> MemberId {
    MemberId::new(id).expect("valid member id")
}

/// A family with a head and an address and no members.
pub fn family(id: &str, head: &str, address: &str) -> Record {
    Record::new(rid(id))
        .with(RecordField::Head, head)
        .with(RecordField::Address, address)
}

pub fn member(id: &str, name: &str, mobile: &str) -> Member {
    Member::new(mid(id))
        .with(MemberField::Name, name)
        .with(MemberField::Mobile, mobile)
}
