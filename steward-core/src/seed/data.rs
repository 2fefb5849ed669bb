//! Static reference data seeded into the organization and security schemas.

/// An organizational unit, keyed by `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrgUnitSeed {
    pub code: &'static str,
    pub name: &'static str,
    pub kind: &'static str,
    pub description: &'static str,
    pub level: i32,
    pub parent: Option<&'static str>,
}

/// A position, keyed by `code`. `org_unit` and `superior` are natural keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSeed {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub org_unit: &'static str,
    pub superior: Option<&'static str>,
    pub rank_level: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionSeed {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub module: &'static str,
    pub kind: &'static str,
}

/// A user, keyed by `username`. The password is hashed before insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSeed {
    pub username: &'static str,
    pub email: &'static str,
    pub password: &'static str,
    pub first_names: &'static str,
    pub last_names: &'static str,
    pub national_id: &'static str,
    pub phone: &'static str,
    pub user_type: &'static str,
    pub status: &'static str,
    pub position: Option<&'static str>,
}

pub const PERMISSIONS: &[PermissionSeed] = &[
    PermissionSeed {
        code: "ADMIN_USUARIOS",
        name: "Administrar Usuarios",
        description: "Crear, modificar y eliminar usuarios del sistema",
        module: "SEGURIDAD",
        kind: "ADMINISTRACION",
    },
    PermissionSeed {
        code: "ADMIN_PERMISOS",
        name: "Administrar Permisos",
        description: "Asignar y revocar permisos a usuarios y puestos",
        module: "SEGURIDAD",
        kind: "ADMINISTRACION",
    },
    PermissionSeed {
        code: "ADMIN_ORGANIZACION",
        name: "Administrar Organización",
        description: "Gestionar unidades orgánicas y puestos",
        module: "ORGANIZACION",
        kind: "ADMINISTRACION",
    },
    PermissionSeed {
        code: "DOC_CREAR",
        name: "Crear Documentos",
        description: "Crear nuevos documentos en el sistema",
        module: "DOCUMENTOS",
        kind: "ESCRITURA",
    },
    PermissionSeed {
        code: "DOC_LEER",
        name: "Leer Documentos",
        description: "Visualizar documentos del sistema",
        module: "DOCUMENTOS",
        kind: "LECTURA",
    },
    PermissionSeed {
        code: "DOC_EDITAR",
        name: "Editar Documentos",
        description: "Modificar documentos existentes",
        module: "DOCUMENTOS",
        kind: "ESCRITURA",
    },
    PermissionSeed {
        code: "DOC_FIRMAR",
        name: "Firmar Documentos",
        description: "Firmar documentos digitalmente",
        module: "DOCUMENTOS",
        kind: "ESCRITURA",
    },
    PermissionSeed {
        code: "TRAMITE_CREAR",
        name: "Crear Trámites",
        description: "Iniciar nuevos trámites",
        module: "TRAMITES",
        kind: "ESCRITURA",
    },
    PermissionSeed {
        code: "TRAMITE_GESTIONAR",
        name: "Gestionar Trámites",
        description: "Procesar y gestionar trámites",
        module: "TRAMITES",
        kind: "ESCRITURA",
    },
    PermissionSeed {
        code: "REPORTES_VER",
        name: "Ver Reportes",
        description: "Acceder a reportes del sistema",
        module: "REPORTES",
        kind: "LECTURA",
    },
    PermissionSeed {
        code: "REPORTES_ADMIN",
        name: "Administrar Reportes",
        description: "Crear y configurar reportes",
        module: "REPORTES",
        kind: "ADMINISTRACION",
    },
];

/// Root unit first; every parent precedes its children.
pub const BASE_ORG_UNITS: &[OrgUnitSeed] = &[
    OrgUnitSeed {
        code: "MDC",
        name: "Municipalidad Distrital de Colca",
        kind: "MUNICIPALIDAD",
        description: "Gobierno Local del Distrito de Colca",
        level: 1,
        parent: None,
    },
    OrgUnitSeed {
        code: "ALC",
        name: "Alcaldía",
        kind: "ORGANO_GOBIERNO",
        description: "Órgano ejecutivo de la municipalidad",
        level: 2,
        parent: Some("MDC"),
    },
    OrgUnitSeed {
        code: "CM",
        name: "Concejo Municipal",
        kind: "ORGANO_GOBIERNO",
        description: "Órgano normativo y fiscalizador",
        level: 2,
        parent: Some("MDC"),
    },
    OrgUnitSeed {
        code: "GM",
        name: "Gerencia Municipal",
        kind: "ORGANO_ALTA_DIRECCION",
        description: "Órgano de dirección y gestión municipal",
        level: 2,
        parent: Some("MDC"),
    },
    OrgUnitSeed {
        code: "SG",
        name: "Secretaría General",
        kind: "ORGANO_APOYO",
        description: "Órgano de apoyo y coordinación",
        level: 3,
        parent: Some("GM"),
    },
    OrgUnitSeed {
        code: "OA",
        name: "Oficina de Administración",
        kind: "ORGANO_APOYO",
        description: "Gestión administrativa y recursos",
        level: 3,
        parent: Some("GM"),
    },
    OrgUnitSeed {
        code: "GDU",
        name: "Gerencia de Desarrollo Urbano",
        kind: "ORGANO_LINEA",
        description: "Desarrollo urbano y territorial",
        level: 3,
        parent: Some("GM"),
    },
    OrgUnitSeed {
        code: "GSP",
        name: "Gerencia de Servicios Públicos",
        kind: "ORGANO_LINEA",
        description: "Gestión de servicios públicos municipales",
        level: 3,
        parent: Some("GM"),
    },
];

pub const EXTENDED_ORG_UNITS: &[OrgUnitSeed] = &[
    OrgUnitSeed {
        code: "SGT",
        name: "Sub Gerencia de Tecnologías",
        kind: "SUB_GERENCIA",
        description: "Área de sistemas y tecnología",
        level: 4,
        parent: Some("OA"),
    },
    OrgUnitSeed {
        code: "AMP",
        name: "Área de Mesa de Partes",
        kind: "AREA",
        description: "Recepción y distribución de documentos",
        level: 4,
        parent: Some("SG"),
    },
    OrgUnitSeed {
        code: "AAC",
        name: "Área de Archivo Central",
        kind: "AREA",
        description: "Gestión del archivo documental",
        level: 4,
        parent: Some("SG"),
    },
];

pub const BASE_POSITIONS: &[PositionSeed] = &[
    PositionSeed {
        code: "ALC-001",
        name: "Alcalde",
        description: "Máxima autoridad ejecutiva municipal",
        org_unit: "ALC",
        superior: None,
        rank_level: 1,
    },
    PositionSeed {
        code: "GM-001",
        name: "Gerente Municipal",
        description: "Responsable de la gestión municipal",
        org_unit: "GM",
        superior: Some("ALC-001"),
        rank_level: 2,
    },
    PositionSeed {
        code: "SG-001",
        name: "Secretario General",
        description: "Responsable de secretaría general",
        org_unit: "SG",
        superior: Some("GM-001"),
        rank_level: 3,
    },
    PositionSeed {
        code: "OA-001",
        name: "Jefe de Administración",
        description: "Responsable de administración",
        org_unit: "OA",
        superior: Some("GM-001"),
        rank_level: 3,
    },
];

pub const EXTENDED_POSITIONS: &[PositionSeed] = &[
    PositionSeed {
        code: "SGT-001",
        name: "Responsable de Sistemas",
        description: "Encargado de tecnologías de información",
        org_unit: "SGT",
        superior: Some("OA-001"),
        rank_level: 4,
    },
    PositionSeed {
        code: "AMP-001",
        name: "Encargado de Mesa de Partes",
        description: "Responsable de mesa de partes",
        org_unit: "AMP",
        superior: Some("SG-001"),
        rank_level: 4,
    },
    PositionSeed {
        code: "AAC-001",
        name: "Archivero",
        description: "Encargado del archivo central",
        org_unit: "AAC",
        superior: Some("SG-001"),
        rank_level: 4,
    },
    PositionSeed {
        code: "OA-002",
        name: "Asistente Administrativo",
        description: "Apoyo en gestión administrativa",
        org_unit: "OA",
        superior: Some("OA-001"),
        rank_level: 4,
    },
];

// Change the password after the first login in any shared environment.
pub const ADMIN_USER: UserSeed = UserSeed {
    username: "admin",
    email: "admin@colca.gob.pe",
    password: "admin123",
    first_names: "Administrador",
    last_names: "del Sistema",
    national_id: "00000000",
    phone: "999999999",
    user_type: "SUPERADMIN",
    status: "ACTIVO",
    position: Some("SG-001"),
};

pub const TEST_USERS: &[UserSeed] = &[
    UserSeed {
        username: "alcalde.test",
        email: "alcalde@test.colca.gob.pe",
        password: "test123",
        first_names: "Juan Carlos",
        last_names: "Pérez Mendoza",
        national_id: "12345678",
        phone: "987654321",
        user_type: "ALCALDE",
        status: "ACTIVO",
        position: Some("ALC-001"),
    },
    UserSeed {
        username: "gerente.test",
        email: "gerente@test.colca.gob.pe",
        password: "test123",
        first_names: "María Elena",
        last_names: "García Flores",
        national_id: "23456789",
        phone: "987654322",
        user_type: "FUNCIONARIO",
        status: "ACTIVO",
        position: Some("GM-001"),
    },
    UserSeed {
        username: "secretario.test",
        email: "secretario@test.colca.gob.pe",
        password: "test123",
        first_names: "Carlos Alberto",
        last_names: "Rodríguez Vega",
        national_id: "34567890",
        phone: "987654323",
        user_type: "FUNCIONARIO",
        status: "ACTIVO",
        position: Some("SG-001"),
    },
    UserSeed {
        username: "admin.desarrollo",
        email: "admin.dev@test.colca.gob.pe",
        password: "dev123",
        first_names: "Desarrollador",
        last_names: "Sistema Test",
        national_id: "99999999",
        phone: "999999998",
        user_type: "FUNCIONARIO",
        status: "ACTIVO",
        position: Some("OA-001"),
    },
];

/// Test users included by the basic scenario.
pub const BASIC_TEST_USERS: &[&str] = &["alcalde.test", "secretario.test"];
